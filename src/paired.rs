//! Reading one series at another series' pivot bars
//!
//! In paired mode the oscillator is not searched for its own pivots. Instead
//! it is sampled on the bars where the trend series confirmed its last two
//! pivots, so both slopes describe the same stretch of time. The sample is
//! taken when the reference pivot is confirmed and kept with it, so the
//! older pivot can be arbitrarily old.

use crate::pivots::{ConfirmedPivot, PivotSide, PivotSlope};

/// A reference pivot and the companion series' value on its bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchoredPivot {
    pub pivot: ConfirmedPivot,
    /// `None` when the companion had no value on that bar (warm-up)
    pub companion: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct AnchoredPair {
    older: Option<AnchoredPivot>,
    newer: Option<AnchoredPivot>,
}

impl AnchoredPair {
    fn push(&mut self, anchored: AnchoredPivot) {
        self.older = self.newer.replace(anchored);
    }

    fn both(&self) -> Option<(AnchoredPivot, AnchoredPivot)> {
        Some((self.older?, self.newer?))
    }
}

/// Reference and companion slopes measured over the same two bars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedSlope {
    pub reference: PivotSlope,
    pub companion: Option<f64>,
}

/// Measures a companion series over a reference series' pivot pairs
#[derive(Debug, Clone, Default)]
pub struct PairedAligner {
    max_age: u64,
    highs: AnchoredPair,
    lows: AnchoredPair,
}

impl PairedAligner {
    pub fn new(paired_max_age: u64) -> Self {
        Self {
            max_age: paired_max_age,
            ..Default::default()
        }
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    /// Record a reference pivot with the companion value seen on its bar.
    /// Non-finite companion values are stored as missing.
    pub fn record(&mut self, pivot: ConfirmedPivot, companion: Option<f64>) {
        let anchored = AnchoredPivot {
            pivot,
            companion: companion.filter(|v| v.is_finite()),
        };
        match pivot.side {
            PivotSide::High => self.highs.push(anchored),
            PivotSide::Low => self.lows.push(anchored),
        }
    }

    /// The side's two anchored pivots, oldest first
    pub fn anchors(&self, side: PivotSide) -> Option<(AnchoredPivot, AnchoredPivot)> {
        match side {
            PivotSide::High => self.highs.both(),
            PivotSide::Low => self.lows.both(),
        }
    }

    /// Companion slope between two anchored pivots.
    ///
    /// `None` if either bar lies after `current_bar` or a companion value is
    /// missing.
    pub fn slope_between(
        first: &AnchoredPivot,
        second: &AnchoredPivot,
        current_bar: u64,
    ) -> Option<f64> {
        if first.pivot.bar > current_bar || second.pivot.bar > current_bar {
            return None;
        }
        let (y1, y2) = (first.companion?, second.companion?);
        Some(PivotSlope::between(first.pivot.bar, y1, second.pivot.bar, y2).value)
    }

    /// Align the companion onto the side's reference pair.
    ///
    /// Returns `None` when the pair is incomplete or its newest pivot is older
    /// than the paired age limit. A fresh pair with a missing companion value
    /// still yields the reference slope.
    pub fn align(&self, side: PivotSide, current_bar: u64) -> Option<PairedSlope> {
        let (first, second) = self.anchors(side)?;
        if current_bar.saturating_sub(second.pivot.bar) > self.max_age {
            return None;
        }
        Some(PairedSlope {
            reference: PivotSlope::from_pair(&first.pivot, &second.pivot),
            companion: Self::slope_between(&first, &second, current_bar),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn low(bar: u64, value: f64) -> ConfirmedPivot {
        ConfirmedPivot {
            bar,
            value,
            side: PivotSide::Low,
        }
    }

    fn aligner(max_age: u64, pivots: &[(u64, f64, Option<f64>)]) -> PairedAligner {
        let mut a = PairedAligner::new(max_age);
        for &(bar, value, companion) in pivots {
            a.record(low(bar, value), companion);
        }
        a
    }

    #[test]
    fn test_reads_companion_at_reference_bars() {
        let a = aligner(10, &[(2, 10.0, Some(1.0)), (5, 7.0, Some(5.0))]);
        let aligned = a.align(PivotSide::Low, 6).unwrap();
        assert_relative_eq!(aligned.companion.unwrap(), (5.0 - 1.0) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(aligned.reference.value, -1.0, epsilon = 1e-12);
        assert!(a.align(PivotSide::High, 6).is_none());
    }

    #[test]
    fn test_only_two_most_recent_anchors_kept() {
        let a = aligner(
            100,
            &[(2, 9.0, Some(0.0)), (5, 8.0, Some(3.0)), (9, 7.0, Some(11.0))],
        );
        let (first, second) = a.anchors(PivotSide::Low).unwrap();
        assert_eq!((first.pivot.bar, second.pivot.bar), (5, 9));
        assert_relative_eq!(a.align(PivotSide::Low, 9).unwrap().companion.unwrap(), 2.0);
    }

    #[test]
    fn test_future_bar_is_rejected() {
        let a = aligner(10, &[(1, 1.0, Some(1.0)), (4, 2.0, Some(2.0))]);
        let (first, second) = a.anchors(PivotSide::Low).unwrap();
        assert_eq!(PairedAligner::slope_between(&first, &second, 3), None);
        assert!(PairedAligner::slope_between(&first, &second, 4).is_some());
    }

    #[test]
    fn test_paired_age_gate() {
        let a = aligner(5, &[(2, 1.0, Some(1.0)), (10, 0.5, Some(1.0))]);
        assert!(a.align(PivotSide::Low, 15).is_some());
        assert!(a.align(PivotSide::Low, 16).is_none());
    }

    #[test]
    fn test_old_first_anchor_is_still_read() {
        let a = aligner(5, &[(3, 9.0, Some(-4.0)), (5_003, 8.0, Some(6.0))]);
        let aligned = a.align(PivotSide::Low, 5_005).unwrap();
        assert_relative_eq!(aligned.companion.unwrap(), 10.0 / 5_000.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_companion_keeps_reference() {
        let a = aligner(10, &[(2, 3.0, None), (6, 1.0, Some(f64::NAN))]);
        let aligned = a.align(PivotSide::Low, 6).unwrap();
        assert_eq!(aligned.companion, None);
        assert_relative_eq!(aligned.reference.value, -0.5);
    }
}
