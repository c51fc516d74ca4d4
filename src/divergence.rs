//! Bullish/bearish divergence classification from pivot slopes
//!
//! Bullish: the oscillator makes higher lows while the trend series makes
//! lower lows. Bearish: the oscillator makes lower highs while the trend
//! series makes higher highs.

use serde::{Deserialize, Serialize};

/// The four slopes a classification is made from; any may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlopeReadings {
    pub low_osc: Option<f64>,
    pub low_trend: Option<f64>,
    pub high_osc: Option<f64>,
    pub high_trend: Option<f64>,
}

/// Divergence flags for one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceState {
    pub bullish: bool,
    pub bearish: bool,
}

impl DivergenceState {
    pub fn is_contradictory(&self) -> bool {
        self.bullish && self.bearish
    }
}

/// Pure slope classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergenceClassifier {
    eps: f64,
    require_both: bool,
}

impl DivergenceClassifier {
    /// `eps` is the absolute slope magnitude below which a leg counts as flat.
    /// With `require_both` each side needs both legs present and past the
    /// threshold; without it either leg is enough.
    pub fn new(eps: f64, require_both: bool) -> Self {
        Self { eps, require_both }
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn require_both(&self) -> bool {
        self.require_both
    }

    pub fn classify(&self, slopes: &SlopeReadings) -> DivergenceState {
        let eps = self.eps;
        let rising = |s: Option<f64>| s.is_some_and(|v| v > eps);
        let falling = |s: Option<f64>| s.is_some_and(|v| v < -eps);

        let osc_higher_low = rising(slopes.low_osc);
        let trend_lower_low = falling(slopes.low_trend);
        let osc_lower_high = falling(slopes.high_osc);
        let trend_higher_high = rising(slopes.high_trend);

        if self.require_both {
            DivergenceState {
                bullish: osc_higher_low && trend_lower_low,
                bearish: osc_lower_high && trend_higher_high,
            }
        } else {
            DivergenceState {
                bullish: osc_higher_low || trend_lower_low,
                bearish: osc_lower_high || trend_higher_high,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_noise_level_slopes_do_not_trigger() {
        let slopes = SlopeReadings {
            low_osc: Some(1e-7),
            low_trend: Some(-1e-7),
            high_osc: Some(-1e-7),
            high_trend: Some(1e-7),
        };
        for require_both in [true, false] {
            let state = DivergenceClassifier::new(EPS, require_both).classify(&slopes);
            assert_eq!(state, DivergenceState::default());
        }
    }

    #[test]
    fn test_bullish_both_series() {
        let slopes = SlopeReadings {
            low_osc: Some(1e-3),
            low_trend: Some(-1e-3),
            ..Default::default()
        };
        let state = DivergenceClassifier::new(EPS, true).classify(&slopes);
        assert!(state.bullish);
        assert!(!state.bearish);
    }

    #[test]
    fn test_bearish_both_series() {
        let slopes = SlopeReadings {
            high_osc: Some(-0.5),
            high_trend: Some(0.5),
            ..Default::default()
        };
        let state = DivergenceClassifier::new(EPS, true).classify(&slopes);
        assert!(state.bearish);
        assert!(!state.bullish);
    }

    #[test]
    fn test_either_series_accepts_single_leg() {
        let slopes = SlopeReadings {
            low_trend: Some(-1e-3),
            ..Default::default()
        };
        assert!(DivergenceClassifier::new(EPS, false).classify(&slopes).bullish);
        assert!(!DivergenceClassifier::new(EPS, true).classify(&slopes).bullish);
    }

    #[test]
    fn test_all_absent() {
        let state = DivergenceClassifier::new(EPS, false).classify(&SlopeReadings::default());
        assert_eq!(state, DivergenceState::default());
    }

    #[test]
    fn test_either_series_can_contradict() {
        let slopes = SlopeReadings {
            low_osc: Some(1.0),
            high_osc: Some(-1.0),
            ..Default::default()
        };
        let state = DivergenceClassifier::new(EPS, false).classify(&slopes);
        assert!(state.is_contradictory());
    }
}
