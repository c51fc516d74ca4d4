//! Parameter Optimization Framework
//!
//! Parallel grid search: each candidate config is backtested on every symbol
//! and summarised into one [`OptimizationResult`].

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::warn;

use crate::backtest::{calculate_metrics, Backtester, BacktestResult};
use crate::strategies::create_strategy;
use crate::strategies::divergence::{config_to_params, DivergenceConfig};
use crate::{Candle, Config, Symbol, Trade};

/// Optimization result for a single parameter combination
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub params: HashMap<String, f64>,
    pub sharpe_ratio: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub profit_factor: f64,
}

pub struct Optimizer {
    data: HashMap<Symbol, Vec<Candle>>,
}

impl Optimizer {
    pub fn new(data: HashMap<Symbol, Vec<Candle>>) -> Self {
        Optimizer { data }
    }

    /// Backtest one config across all symbols
    ///
    /// Returns `None` when the config is rejected or a run fails.
    pub fn evaluate(&self, config: &Config) -> Option<OptimizationResult> {
        let strategy_config = match DivergenceConfig::from_value(&config.strategy) {
            Ok(c) => c,
            Err(e) => {
                warn!("Skipping invalid parameter set: {}", e);
                return None;
            }
        };

        let mut runs: Vec<BacktestResult> = Vec::with_capacity(self.data.len());
        for (symbol, candles) in &self.data {
            let run = create_strategy(config, symbol)
                .and_then(|s| Backtester::new(config, symbol.clone(), s).run(candles));
            match run {
                Ok(result) => runs.push(result),
                Err(e) => {
                    warn!(symbol = %symbol, "Backtest failed: {:#}", e);
                    return None;
                }
            }
        }
        if runs.is_empty() {
            return None;
        }

        let n = runs.len() as f64;
        let trades: Vec<Trade> = runs.iter().flat_map(|r| r.trades.clone()).collect();
        // Pooled trades give win rate and profit factor across symbols
        let pooled = calculate_metrics(&trades, &[], 0.0, 1.0, 0.0);

        Some(OptimizationResult {
            params: config_to_params(&strategy_config),
            sharpe_ratio: runs.iter().map(|r| r.metrics.sharpe_ratio).sum::<f64>() / n,
            total_return: runs.iter().map(|r| r.metrics.total_return).sum::<f64>() / n,
            max_drawdown: runs
                .iter()
                .map(|r| r.metrics.max_drawdown)
                .fold(0.0, f64::max),
            win_rate: pooled.win_rate,
            total_trades: trades.len(),
            profit_factor: pooled.profit_factor,
        })
    }

    /// Evaluate all configs in parallel
    pub fn optimize(
        &self,
        configs: &[Config],
        progress: Option<&ProgressBar>,
    ) -> Vec<OptimizationResult> {
        tracing::info!("Testing {} parameter combinations", configs.len());

        configs
            .par_iter()
            .filter_map(|config| {
                let result = self.evaluate(config);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    }

    /// Evaluate configs one after another
    pub fn optimize_sequential(&self, configs: &[Config]) -> Vec<OptimizationResult> {
        tracing::info!(
            "Testing {} parameter combinations sequentially",
            configs.len()
        );
        configs.iter().filter_map(|c| self.evaluate(c)).collect()
    }

    /// Sort optimization results by specified metric, best first
    pub fn sort_results(results: &mut [OptimizationResult], sort_by: &str) {
        let key = |r: &OptimizationResult| match sort_by {
            "return" => r.total_return,
            "win_rate" => r.win_rate,
            "profit_factor" => r.profit_factor,
            _ => r.sharpe_ratio,
        };
        results.sort_by(|a, b| {
            key(b)
                .partial_cmp(&key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}
