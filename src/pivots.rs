//! Pivot-pair bookkeeping and pivot-to-pivot slopes

use serde::{Deserialize, Serialize};

use crate::swing::SwingSignal;

/// Which extreme a pivot marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PivotSide {
    High,
    Low,
}

/// A swing confirmed by the detector; immutable once created
///
/// `bar` is the bar on which the swing was confirmed, `k` bars after the
/// extreme itself. Ages and paired reads are measured from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPivot {
    pub bar: u64,
    pub value: f64,
    pub side: PivotSide,
}

impl ConfirmedPivot {
    /// Pivots carried by a detector signal emitted on `confirmed_at`, low first.
    pub fn from_signal(
        signal: &SwingSignal,
        confirmed_at: u64,
    ) -> impl Iterator<Item = ConfirmedPivot> {
        let pivot = |flag: bool, side| {
            signal.center.filter(|_| flag).map(|p| ConfirmedPivot {
                bar: confirmed_at,
                value: p.value,
                side,
            })
        };
        let low = pivot(signal.is_swing_low, PivotSide::Low);
        let high = pivot(signal.is_swing_high, PivotSide::High);
        low.into_iter().chain(high)
    }
}

/// Two most recent pivots of one side, oldest first
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PivotPair {
    older: Option<ConfirmedPivot>,
    newer: Option<ConfirmedPivot>,
}

impl PivotPair {
    /// Append a pivot, evicting the oldest when both slots are taken
    pub fn push(&mut self, pivot: ConfirmedPivot) {
        match self.newer {
            None => self.newer = Some(pivot),
            Some(prev) => {
                self.older = Some(prev);
                self.newer = Some(pivot);
            }
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.older.is_some()) + usize::from(self.newer.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.newer.is_none()
    }

    pub fn newest(&self) -> Option<&ConfirmedPivot> {
        self.newer.as_ref()
    }

    /// Both pivots, oldest first, once two have been seen
    pub fn both(&self) -> Option<(ConfirmedPivot, ConfirmedPivot)> {
        Some((self.older?, self.newer?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfirmedPivot> {
        self.older.iter().chain(self.newer.iter())
    }

    /// Bars elapsed since the newest pivot
    pub fn age(&self, current_bar: u64) -> Option<u64> {
        self.newer.map(|p| current_bar.saturating_sub(p.bar))
    }
}

/// Slope between the two pivots of a pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotSlope {
    pub dx: u64,
    pub dy: f64,
    pub value: f64,
}

impl PivotSlope {
    /// Two-point slope; a zero bar distance is treated as 1
    pub fn between(bar1: u64, value1: f64, bar2: u64, value2: f64) -> Self {
        let dx = bar2.saturating_sub(bar1).max(1);
        let dy = value2 - value1;
        Self {
            dx,
            dy,
            value: dy / dx as f64,
        }
    }

    pub fn from_pair(first: &ConfirmedPivot, second: &ConfirmedPivot) -> Self {
        Self::between(first.bar, first.value, second.bar, second.value)
    }
}

/// High and low pivot pairs for one series
#[derive(Debug, Clone, Default)]
pub struct PivotTracker {
    highs: PivotPair,
    lows: PivotPair,
}

impl PivotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pivot: ConfirmedPivot) {
        self.pair_mut(pivot.side).push(pivot);
    }

    /// Record every pivot carried by a detector signal emitted on `bar`
    pub fn record(&mut self, signal: &SwingSignal, bar: u64) {
        for pivot in ConfirmedPivot::from_signal(signal, bar) {
            self.push(pivot);
        }
    }

    pub fn pair(&self, side: PivotSide) -> &PivotPair {
        match side {
            PivotSide::High => &self.highs,
            PivotSide::Low => &self.lows,
        }
    }

    fn pair_mut(&mut self, side: PivotSide) -> &mut PivotPair {
        match side {
            PivotSide::High => &mut self.highs,
            PivotSide::Low => &mut self.lows,
        }
    }

    /// Slope of the side's pair, `None` with fewer than two pivots or when the
    /// newest pivot is older than `max_age` bars. The older pivot's age is
    /// not constrained.
    pub fn slope(&self, side: PivotSide, current_bar: u64, max_age: u64) -> Option<PivotSlope> {
        let pair = self.pair(side);
        let (first, second) = pair.both()?;
        if pair.age(current_bar)? > max_age {
            return None;
        }
        Some(PivotSlope::from_pair(&first, &second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low(bar: u64, value: f64) -> ConfirmedPivot {
        ConfirmedPivot {
            bar,
            value,
            side: PivotSide::Low,
        }
    }

    #[test]
    fn test_pair_keeps_two_most_recent_oldest_first() {
        let mut pair = PivotPair::default();
        for i in 1..=5 {
            pair.push(low(i * 10, i as f64));
        }
        let bars: Vec<u64> = pair.iter().map(|p| p.bar).collect();
        assert_eq!(bars, vec![40, 50]);
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn test_single_pivot_has_no_slope() {
        let mut tracker = PivotTracker::new();
        tracker.push(low(10, 1.0));
        assert_eq!(tracker.slope(PivotSide::Low, 10, u64::MAX), None);
    }

    #[test]
    fn test_staleness_gate() {
        let mut tracker = PivotTracker::new();
        tracker.push(low(10, 1.0));
        tracker.push(low(40, 4.0));
        assert_eq!(tracker.slope(PivotSide::Low, 100, 30), None);
        let slope = tracker.slope(PivotSide::Low, 100, 61).unwrap();
        assert_eq!(slope.dx, 30);
        assert!((slope.value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_sides_are_tracked_separately() {
        let mut tracker = PivotTracker::new();
        tracker.push(low(1, 1.0));
        tracker.push(ConfirmedPivot {
            bar: 2,
            value: 5.0,
            side: PivotSide::High,
        });
        assert_eq!(tracker.pair(PivotSide::Low).len(), 1);
        assert_eq!(tracker.pair(PivotSide::High).len(), 1);
    }

    #[test]
    fn test_zero_dx_falls_back_to_one() {
        let slope = PivotSlope::between(7, 1.0, 7, 3.0);
        assert_eq!(slope.dx, 1);
        assert_eq!(slope.value, 2.0);
    }

    #[test]
    fn test_pivot_is_stamped_with_confirmation_bar() {
        let mut detector = crate::swing::SwingDetector::new(2);
        let mut tracker = PivotTracker::new();
        for (i, v) in [5.0, 4.0, 1.0, 4.0, 5.0].into_iter().enumerate() {
            let bar = i as u64 + 1;
            tracker.record(&detector.update(bar, v), bar);
        }
        let newest = tracker.pair(PivotSide::Low).newest().copied().unwrap();
        // Extreme on bar 3, confirmed two bars later
        assert_eq!(newest.bar, 5);
        assert_eq!(newest.value, 1.0);
    }
}
