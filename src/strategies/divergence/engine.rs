//! Per-bar divergence evaluation over an oscillator and a trend series

use thiserror::Error;
use tracing::debug;

use crate::divergence::{DivergenceClassifier, DivergenceState, SlopeReadings};
use crate::paired::PairedAligner;
use crate::pivots::{ConfirmedPivot, PivotSide, PivotTracker};
use crate::swing::SwingDetector;

use super::config::DivergenceConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("bar {bar} does not come after previous bar {previous}")]
    OutOfOrderBar { bar: u64, previous: u64 },
}

/// Everything the engine derived for one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergenceReading {
    pub bar: u64,
    pub slopes: SlopeReadings,
    pub state: DivergenceState,
}

/// Swing detection, pivot tracking and classification for one instrument.
///
/// Owns one detector and one tracker per series; instances must not be shared
/// between instruments.
#[derive(Debug, Clone)]
pub struct DivergenceEngine {
    oscillator_swings: SwingDetector,
    trend_swings: SwingDetector,
    oscillator_pivots: PivotTracker,
    trend_pivots: PivotTracker,
    aligner: PairedAligner,
    classifier: DivergenceClassifier,
    max_pivot_age: u64,
    use_paired: bool,
    debug: bool,
    last_bar: Option<u64>,
}

impl DivergenceEngine {
    pub fn new(config: &DivergenceConfig) -> Self {
        Self {
            oscillator_swings: SwingDetector::new(config.lookback),
            trend_swings: SwingDetector::new(config.lookback),
            oscillator_pivots: PivotTracker::new(),
            trend_pivots: PivotTracker::new(),
            aligner: PairedAligner::new(config.paired_max_age_bars),
            classifier: DivergenceClassifier::new(
                config.slope_eps,
                config.require_both_series,
            ),
            max_pivot_age: config.max_pivot_age_bars,
            use_paired: config.use_paired_at_price,
            debug: config.strategy_debug,
            last_bar: None,
        }
    }

    pub fn oscillator_pivots(&self) -> &PivotTracker {
        &self.oscillator_pivots
    }

    pub fn trend_pivots(&self) -> &PivotTracker {
        &self.trend_pivots
    }

    pub fn last_bar(&self) -> Option<u64> {
        self.last_bar
    }

    /// Feed one bar. Either series may be missing while its indicator warms up.
    pub fn step(
        &mut self,
        bar: u64,
        oscillator: Option<f64>,
        trend: Option<f64>,
    ) -> Result<DivergenceReading, EngineError> {
        if let Some(previous) = self.last_bar {
            if bar <= previous {
                return Err(EngineError::OutOfOrderBar { bar, previous });
            }
        }
        self.last_bar = Some(bar);

        let oscillator = oscillator.filter(|v| v.is_finite());
        if let Some(value) = oscillator {
            let signal = self.oscillator_swings.update(bar, value);
            for pivot in ConfirmedPivot::from_signal(&signal, bar) {
                if self.debug {
                    debug!(bar, value = pivot.value, side = ?pivot.side, "Oscillator swing");
                }
                self.oscillator_pivots.push(pivot);
            }
        }

        if let Some(value) = trend.filter(|v| v.is_finite()) {
            let signal = self.trend_swings.update(bar, value);
            for pivot in ConfirmedPivot::from_signal(&signal, bar) {
                if self.debug {
                    debug!(bar, value = pivot.value, side = ?pivot.side, "Trend swing");
                }
                self.trend_pivots.push(pivot);
                self.aligner.record(pivot, oscillator);
            }
        }

        let slopes = if self.use_paired {
            self.paired_slopes(bar)
        } else {
            self.direct_slopes(bar)
        };
        let state = self.classifier.classify(&slopes);

        if self.debug {
            debug!(
                bar,
                use_paired = self.use_paired,
                low_slope_osc = ?slopes.low_osc,
                low_slope_trend = ?slopes.low_trend,
                high_slope_osc = ?slopes.high_osc,
                high_slope_trend = ?slopes.high_trend,
                bullish = state.bullish,
                bearish = state.bearish,
                "Divergence eval"
            );
        }

        Ok(DivergenceReading { bar, slopes, state })
    }

    fn direct_slopes(&self, bar: u64) -> SlopeReadings {
        let slope = |tracker: &PivotTracker, side| {
            tracker
                .slope(side, bar, self.max_pivot_age)
                .map(|s| s.value)
        };
        SlopeReadings {
            low_osc: slope(&self.oscillator_pivots, PivotSide::Low),
            low_trend: slope(&self.trend_pivots, PivotSide::Low),
            high_osc: slope(&self.oscillator_pivots, PivotSide::High),
            high_trend: slope(&self.trend_pivots, PivotSide::High),
        }
    }

    /// Oscillator read at the trend's pivot bars
    fn paired_slopes(&self, bar: u64) -> SlopeReadings {
        let side_slopes = |side| {
            let aligned = self.aligner.align(side, bar);
            let trend = aligned
                .and_then(|_| self.trend_pivots.slope(side, bar, self.max_pivot_age))
                .map(|s| s.value);
            (aligned.and_then(|p| p.companion), trend)
        };

        let (low_osc, low_trend) = side_slopes(PivotSide::Low);
        let (high_osc, high_trend) = side_slopes(PivotSide::High);
        SlopeReadings {
            low_osc,
            low_trend,
            high_osc,
            high_trend,
        }
    }
}
