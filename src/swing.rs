//! Causal swing-point detection on an arbitrary numeric series
//!
//! A swing high (low) is the centre sample of a `2k+1` window that equals the
//! window maximum (minimum). The centre can only be judged once the `k`
//! samples after it have been observed, so every confirmation arrives exactly
//! `k` bars late and never depends on data beyond the current bar.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Absolute tolerance used when comparing the centre against the window extremes
pub const SWING_TOLERANCE: f64 = 1e-10;

/// One observed sample of a series, addressed by bar index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub bar: u64,
    pub value: f64,
}

/// Result of feeding one sample to a [`SwingDetector`]
///
/// Both flags may be set at once when the window is flat within tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwingSignal {
    pub is_swing_high: bool,
    pub is_swing_low: bool,
    /// The window centre, present only when at least one flag is set
    pub center: Option<SeriesPoint>,
}

impl SwingSignal {
    /// "Not yet confirmable" / "no swing this bar"
    pub fn none() -> Self {
        Self::default()
    }

    /// Confirmed value, NaN when nothing was confirmed
    pub fn confirmed_value(&self) -> f64 {
        self.center.map_or(f64::NAN, |p| p.value)
    }

    pub fn is_empty(&self) -> bool {
        !self.is_swing_high && !self.is_swing_low
    }
}

/// Rolling-window swing detector for a single series
///
/// Each tracked series needs its own instance; window state is never shared.
#[derive(Debug, Clone)]
pub struct SwingDetector {
    lookback: usize,
    window: VecDeque<SeriesPoint>,
}

impl SwingDetector {
    /// Create a detector with half-width `lookback` (window `2*lookback + 1`).
    ///
    /// `lookback` is validated by the strategy configuration; a zero here is
    /// bumped to 1 so the window is never degenerate.
    pub fn new(lookback: usize) -> Self {
        let lookback = lookback.max(1);
        Self {
            lookback,
            window: VecDeque::with_capacity(2 * lookback + 1),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn window_len(&self) -> usize {
        2 * self.lookback + 1
    }

    /// Number of samples currently held (at most the window width)
    pub fn observed(&self) -> usize {
        self.window.len()
    }

    /// Feed the sample observed at `bar` and report whether the sample `k`
    /// positions earlier is now a confirmed swing.
    ///
    /// Non-finite samples are ignored and produce no signal.
    pub fn update(&mut self, bar: u64, value: f64) -> SwingSignal {
        if !value.is_finite() {
            return SwingSignal::none();
        }

        if self.window.len() == self.window_len() {
            self.window.pop_front();
        }
        self.window.push_back(SeriesPoint { bar, value });

        if self.window.len() < self.window_len() {
            return SwingSignal::none();
        }

        let (highest, lowest) = self
            .window
            .iter()
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), p| {
                (hi.max(p.value), lo.min(p.value))
            });

        let center = self.window[self.lookback];
        let is_swing_high = (center.value - highest).abs() <= SWING_TOLERANCE;
        let is_swing_low = (center.value - lowest).abs() <= SWING_TOLERANCE;

        SwingSignal {
            is_swing_high,
            is_swing_low,
            center: (is_swing_high || is_swing_low).then_some(center),
        }
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Run a fresh detector over a whole series, bar indices starting at 1.
///
/// Element `i` of the result is the signal emitted when sample `i` was fed,
/// so it is identical to the online sequence by construction of the detector.
pub fn detect_batch(lookback: usize, series: &[f64]) -> Vec<SwingSignal> {
    let mut detector = SwingDetector::new(lookback);
    series
        .iter()
        .enumerate()
        .map(|(i, &v)| detector.update(i as u64 + 1, v))
        .collect()
}
