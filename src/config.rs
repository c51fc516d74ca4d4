//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with `.env` and
//! environment variable overrides for the strategy parameters.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    #[serde(default = "default_strategy")]
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

fn default_strategy_name() -> String {
    "divergence".to_string()
}

fn default_strategy() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Clone, Copy)]
enum EnvKind {
    Int,
    Float,
    Bool,
}

/// Environment variables that override keys of the `strategy` section
const STRATEGY_ENV_OVERRIDES: &[(&str, EnvKind)] = &[
    ("LOOKBACK", EnvKind::Int),
    ("TSI_FAST", EnvKind::Int),
    ("TSI_SLOW", EnvKind::Int),
    ("EMA_PERIOD", EnvKind::Int),
    ("MAX_PIVOT_AGE_BARS", EnvKind::Int),
    ("PAIRED_MAX_AGE_BARS", EnvKind::Int),
    ("ENTRY_EXPIRY_BARS", EnvKind::Int),
    ("SLOPE_EPS", EnvKind::Float),
    ("STOP_LOSS_PCT", EnvKind::Float),
    ("TAKE_PROFIT_PCT", EnvKind::Float),
    ("ENTRY_LIMIT_OFFSET_PCT", EnvKind::Float),
    ("POSITION_SIZE", EnvKind::Float),
    ("MAX_POSITION_VALUE", EnvKind::Float),
    ("USE_MARKET_PARENT", EnvKind::Bool),
    ("USE_PAIRED_AT_PRICE", EnvKind::Bool),
    ("REQUIRE_BOTH_SERIES", EnvKind::Bool),
    ("STRATEGY_DEBUG", EnvKind::Bool),
];

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from JSON file, then apply `.env`/environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(symbols) = lookup("SYMBOL") {
            let symbols: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                self.trading.symbols = symbols;
            }
        }

        let Some(section) = self.strategy.as_object_mut() else {
            bail!("strategy section must be a JSON object, got {}", self.strategy);
        };

        for &(env_key, kind) in STRATEGY_ENV_OVERRIDES {
            let Some(raw) = lookup(env_key) else {
                continue;
            };
            let value = match kind {
                EnvKind::Int => raw
                    .trim()
                    .parse::<u64>()
                    .map(serde_json::Value::from)
                    .with_context(|| {
                        format!("{env_key} must be a non-negative integer, got '{raw}'")
                    })?,
                EnvKind::Float => raw
                    .trim()
                    .parse::<f64>()
                    .map(serde_json::Value::from)
                    .with_context(|| format!("{env_key} must be a number, got '{raw}'"))?,
                EnvKind::Bool => match parse_bool(&raw) {
                    Some(b) => serde_json::Value::from(b),
                    None => bail!("{env_key} must be 0/1/true/false, got '{raw}'"),
                },
            };
            section.insert(env_key.to_ascii_lowercase(), value);
        }
        Ok(())
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.trading.symbols()
    }

    pub fn timeframe(&self) -> &str {
        &self.backtest.timeframe
    }

    /// Set a single strategy parameter (used by the optimizer)
    pub fn set_strategy_param(&mut self, key: &str, value: serde_json::Value) {
        if !self.strategy.is_object() {
            self.strategy = default_strategy();
        }
        if let Some(obj) = self.strategy.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            trading: TradingConfig::default(),
            strategy_name: default_strategy_name(),
            strategy: default_strategy(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub initial_capital: f64,
    /// Commission as a fraction of fill notional
    pub commission: f64,
    /// Market-order slippage as a fraction of price
    pub slippage: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec!["NQ".to_string()],
            initial_capital: 100_000.0,
            commission: 0.0,
            slippage: 0.0,
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub results_dir: String,
    pub timeframe: String,
    /// Bars per year, used to annualise the Sharpe ratio
    pub periods_per_year: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub write_report: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            results_dir: "backtest_results".to_string(),
            timeframe: "1d".to_string(),
            periods_per_year: 252.0,
            start_date: None,
            end_date: None,
            write_report: true,
        }
    }
}
