//! Divergence Strategy Configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("lookback must be at least 1, got {0}")]
    InvalidLookback(usize),

    #[error("{0} must be at least 1")]
    ZeroPeriod(&'static str),

    #[error("slope_eps must be a finite, non-negative number, got {0}")]
    InvalidSlopeEps(f64),

    #[error("take_profit_pct must be positive, got {0}")]
    InvalidTakeProfit(f64),

    #[error("stop_loss_pct must lie in (0, 1), got {0}")]
    InvalidStopLoss(f64),

    #[error("entry_limit_offset_pct must not be negative, got {0}")]
    NegativeEntryOffset(f64),

    #[error("position_size must be positive, got {0}")]
    InvalidPositionSize(f64),

    #[error("max_position_value must be positive, got {0}")]
    InvalidMaxPositionValue(f64),

    #[error("entry_expiry_bars must be at least 1 when set")]
    ZeroEntryExpiry,

    #[error("invalid divergence strategy config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the swing-pivot divergence strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceConfig {
    /// Bars on each side of a swing (default: 1)
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// TSI first smoothing period (default: 25)
    #[serde(default = "default_tsi_fast")]
    pub tsi_fast: usize,

    /// TSI second smoothing period (default: 13)
    #[serde(default = "default_tsi_slow")]
    pub tsi_slow: usize,

    /// Trend EMA period (default: 25)
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,

    /// Slopes within ±eps count as flat (default: 1e-6)
    #[serde(default = "default_slope_eps")]
    pub slope_eps: f64,

    /// Newest pivot older than this many bars makes a slope absent (default: 50)
    #[serde(default = "default_max_pivot_age")]
    pub max_pivot_age_bars: u64,

    /// Paired-mode age limit for the trend pivot pair (default: 200)
    #[serde(default = "default_paired_max_age")]
    pub paired_max_age_bars: u64,

    /// Read the oscillator at the trend's pivot bars (default: true)
    #[serde(default = "default_true")]
    pub use_paired_at_price: bool,

    /// Both legs must agree for a divergence (default: true)
    #[serde(default = "default_true")]
    pub require_both_series: bool,

    /// Entry limit offset from close (default: 0.001)
    #[serde(default = "default_entry_offset")]
    pub entry_limit_offset_pct: f64,

    /// Take profit distance from close (default: 0.10)
    #[serde(default = "default_take_profit")]
    pub take_profit_pct: f64,

    /// Stop loss distance from close (default: 0.05)
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: f64,

    /// Submit the entry as a market order instead of a limit (default: false)
    #[serde(default)]
    pub use_market_parent: bool,

    /// Units per entry (default: 1.0)
    #[serde(default = "default_position_size")]
    pub position_size: f64,

    /// Entries worth more than this at the close are skipped (default: 50000)
    #[serde(default = "default_max_position_value")]
    pub max_position_value: Option<f64>,

    /// Per-bar pivot and divergence logging (default: false)
    #[serde(default)]
    pub strategy_debug: bool,

    /// Cancel and re-place an unfilled entry after this many bars (default: never)
    #[serde(default)]
    pub entry_expiry_bars: Option<u64>,
}

fn default_lookback() -> usize {
    1
}

fn default_tsi_fast() -> usize {
    25
}

fn default_tsi_slow() -> usize {
    13
}

fn default_ema_period() -> usize {
    25
}

fn default_slope_eps() -> f64 {
    1e-6
}

fn default_max_pivot_age() -> u64 {
    50
}

fn default_paired_max_age() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_entry_offset() -> f64 {
    0.001
}

fn default_take_profit() -> f64 {
    0.10
}

fn default_stop_loss() -> f64 {
    0.05
}

fn default_position_size() -> f64 {
    1.0
}

fn default_max_position_value() -> Option<f64> {
    Some(50_000.0)
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            tsi_fast: default_tsi_fast(),
            tsi_slow: default_tsi_slow(),
            ema_period: default_ema_period(),
            slope_eps: default_slope_eps(),
            max_pivot_age_bars: default_max_pivot_age(),
            paired_max_age_bars: default_paired_max_age(),
            use_paired_at_price: true,
            require_both_series: true,
            entry_limit_offset_pct: default_entry_offset(),
            take_profit_pct: default_take_profit(),
            stop_loss_pct: default_stop_loss(),
            use_market_parent: false,
            position_size: default_position_size(),
            max_position_value: default_max_position_value(),
            strategy_debug: false,
            entry_expiry_bars: None,
        }
    }
}

impl DivergenceConfig {
    /// Deserialize the `strategy` section and validate it
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: DivergenceConfig = serde_json::from_value(value.clone())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback < 1 {
            return Err(ConfigError::InvalidLookback(self.lookback));
        }
        for (name, period) in [
            ("tsi_fast", self.tsi_fast),
            ("tsi_slow", self.tsi_slow),
            ("ema_period", self.ema_period),
        ] {
            if period == 0 {
                return Err(ConfigError::ZeroPeriod(name));
            }
        }
        if !self.slope_eps.is_finite() || self.slope_eps < 0.0 {
            return Err(ConfigError::InvalidSlopeEps(self.slope_eps));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct.is_finite()) {
            return Err(ConfigError::InvalidTakeProfit(self.take_profit_pct));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(ConfigError::InvalidStopLoss(self.stop_loss_pct));
        }
        if !(self.entry_limit_offset_pct >= 0.0 && self.entry_limit_offset_pct.is_finite()) {
            return Err(ConfigError::NegativeEntryOffset(self.entry_limit_offset_pct));
        }
        if !(self.position_size > 0.0 && self.position_size.is_finite()) {
            return Err(ConfigError::InvalidPositionSize(self.position_size));
        }
        if let Some(max_value) = self.max_position_value {
            if !(max_value > 0.0) {
                return Err(ConfigError::InvalidMaxPositionValue(max_value));
            }
        }
        if self.entry_expiry_bars == Some(0) {
            return Err(ConfigError::ZeroEntryExpiry);
        }
        Ok(())
    }
}
