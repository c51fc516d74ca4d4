//! Technical indicators powered by the `ta` crate
//!
//! Batch functions return one `Option` per input, `None` until the indicator
//! has warmed up. Streaming variants hold their own state and are fed one
//! value per bar.
//!
//! Available indicators:
//! - Moving averages: SMA, EMA
//! - Momentum: True Strength Index (double-smoothed price change)

use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("indicator period must be at least 1, got {0}")]
    InvalidPeriod(usize),
}

fn ema_with_period(period: usize) -> Result<ExponentialMovingAverage, IndicatorError> {
    ExponentialMovingAverage::new(period).map_err(|_| IndicatorError::InvalidPeriod(period))
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match StreamingEma::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values.iter().map(|&value| indicator.next(value)).collect()
}

/// EMA fed one value at a time
#[derive(Debug, Clone)]
pub struct StreamingEma {
    inner: ExponentialMovingAverage,
    period: usize,
    seen: usize,
}

impl StreamingEma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        Ok(Self {
            inner: ema_with_period(period)?,
            period,
            seen: 0,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn is_ready(&self) -> bool {
        self.seen >= self.period
    }

    /// Feed a value; `None` until `period` values have been seen
    pub fn next(&mut self, value: f64) -> Option<f64> {
        let out = self.inner.next(value);
        self.seen += 1;
        self.is_ready().then_some(out)
    }
}

// =============================================================================
// Momentum
// =============================================================================

/// True Strength Index.
///
/// `100 × EMA_slow(EMA_fast(Δclose)) / EMA_slow(EMA_fast(|Δclose|))`, with a
/// zero denominator reported as 0. Ready once `fast + slow` closes have been
/// seen.
#[derive(Debug, Clone)]
pub struct TrueStrengthIndex {
    fast_num: ExponentialMovingAverage,
    slow_num: ExponentialMovingAverage,
    fast_den: ExponentialMovingAverage,
    slow_den: ExponentialMovingAverage,
    prev_close: Option<f64>,
    seen: usize,
    warmup: usize,
}

impl TrueStrengthIndex {
    pub fn new(fast: usize, slow: usize) -> Result<Self, IndicatorError> {
        Ok(Self {
            fast_num: ema_with_period(fast)?,
            slow_num: ema_with_period(slow)?,
            fast_den: ema_with_period(fast)?,
            slow_den: ema_with_period(slow)?,
            prev_close: None,
            seen: 0,
            warmup: fast + slow,
        })
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn next(&mut self, close: f64) -> Option<f64> {
        self.seen += 1;
        let prev = self.prev_close.replace(close)?;

        let change = close - prev;
        let num = self.slow_num.next(self.fast_num.next(change));
        let den = self.slow_den.next(self.fast_den.next(change.abs()));

        if self.seen < self.warmup {
            return None;
        }
        if den.abs() < f64::EPSILON {
            Some(0.0)
        } else {
            Some(100.0 * num / den)
        }
    }
}

/// Calculate True Strength Index over a close series
pub fn tsi(closes: &[f64], fast: usize, slow: usize) -> Vec<Option<f64>> {
    match TrueStrengthIndex::new(fast, slow) {
        Ok(mut indicator) => closes.iter().map(|&c| indicator.next(c)).collect(),
        Err(_) => vec![None; closes.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        // SMA of [1,2,3] = 2.0
        assert_relative_eq!(result[2].unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(result[4].unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ema() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        let ema_val = result[4].unwrap();
        assert!(ema_val > 3.0 && ema_val < 5.0);
    }

    #[test]
    fn test_zero_period_is_rejected() {
        assert_eq!(
            StreamingEma::new(0).unwrap_err(),
            IndicatorError::InvalidPeriod(0)
        );
        assert!(TrueStrengthIndex::new(25, 0).is_err());
    }

    #[test]
    fn test_tsi_warmup() {
        let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let result = tsi(&closes, 5, 3);
        assert!(result[..7].iter().all(Option::is_none));
        assert!(result[7].is_some());
    }

    #[test]
    fn test_tsi_saturates_on_monotonic_moves() {
        let rising: Vec<f64> = (1..=60).map(|i| 100.0 + i as f64).collect();
        let up = tsi(&rising, 25, 13);
        assert_relative_eq!(up.last().unwrap().unwrap(), 100.0, epsilon = 1e-6);

        let falling: Vec<f64> = (1..=60).map(|i| 100.0 - i as f64 * 0.5).collect();
        let down = tsi(&falling, 25, 13);
        assert_relative_eq!(down.last().unwrap().unwrap(), -100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tsi_flat_prices_read_zero() {
        let flat = vec![50.0; 40];
        let result = tsi(&flat, 25, 13);
        assert_eq!(result.last().copied().flatten(), Some(0.0));
    }
}
