//! Swing-Pivot Divergence Strategy
//!
//! Trades disagreement between a momentum oscillator (TSI) and a trend
//! average (EMA) at their swing pivots.
//!
//! ## Entry Logic
//! - Long: oscillator makes a higher low while the EMA makes a lower low
//! - Short: oscillator makes a lower high while the EMA makes a higher high
//!
//! Entries are bracket orders: a limit (or market) parent offset from the
//! close, with a take-profit and a stop-loss attached.
//!
//! ## Exit Logic
//! 1. Take profit / stop loss legs of the bracket
//! 2. Opposite divergence closes the position at market

pub mod config;
pub mod engine;
pub mod grid_params;
pub mod sequencer;
pub mod strategy;

pub use config::{ConfigError, DivergenceConfig};
pub use engine::{DivergenceEngine, DivergenceReading, EngineError};
pub use grid_params::GridParams;
pub use sequencer::{OrderParams, SignalSequencer, Transition};
pub use strategy::DivergenceStrategy;

use crate::strategies::Strategy;
use crate::{Config, Symbol};
use anyhow::Result;
use std::collections::HashMap;

/// Strategy factory for the registry
pub fn create(config: &Config, symbol: &Symbol) -> Result<Box<dyn Strategy>> {
    let strategy_config = DivergenceConfig::from_value(&config.strategy)?;
    Ok(Box::new(DivergenceStrategy::new(
        symbol.clone(),
        strategy_config,
    )?))
}

/// Convert config to params for reporting
pub fn config_to_params(config: &DivergenceConfig) -> HashMap<String, f64> {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let mut params = HashMap::new();
    params.insert("lookback".to_string(), config.lookback as f64);
    params.insert("slope_eps".to_string(), config.slope_eps);
    params.insert(
        "max_pivot_age_bars".to_string(),
        config.max_pivot_age_bars as f64,
    );
    params.insert(
        "use_paired_at_price".to_string(),
        flag(config.use_paired_at_price),
    );
    params.insert(
        "require_both_series".to_string(),
        flag(config.require_both_series),
    );
    params.insert("take_profit_pct".to_string(), config.take_profit_pct);
    params.insert("stop_loss_pct".to_string(), config.stop_loss_pct);
    params
}

/// Format params for display
pub fn format_params(params: &HashMap<String, f64>) -> String {
    let get = |key: &str| params.get(key).copied().unwrap_or(0.0);
    let yn = |key: &str| if get(key) > 0.5 { "Y" } else { "N" };
    format!(
        "Eps:{:.0e} Age:{} Paired:{} Both:{} TP:{:.1}% SL:{:.1}%",
        get("slope_eps"),
        get("max_pivot_age_bars") as u64,
        yn("use_paired_at_price"),
        yn("require_both_series"),
        get("take_profit_pct") * 100.0,
        get("stop_loss_pct") * 100.0,
    )
}
