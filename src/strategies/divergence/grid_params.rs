//! Grid search parameters for the divergence strategy

use crate::Config;
use itertools::iproduct;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    pub slope_eps: Vec<f64>,
    pub max_pivot_age_bars: Vec<u64>,
    pub use_paired_at_price: Vec<bool>,
    pub require_both_series: Vec<bool>,
    pub take_profit_pcts: Vec<f64>,
    pub stop_loss_pcts: Vec<f64>,
}

impl GridParams {
    /// Quick: 2×2×2×1×2×2 = 32 combinations
    pub fn quick() -> Self {
        Self {
            slope_eps: vec![1e-6, 1e-3],
            max_pivot_age_bars: vec![30, 50],
            use_paired_at_price: vec![true, false],
            require_both_series: vec![true],
            take_profit_pcts: vec![0.05, 0.10],
            stop_loss_pcts: vec![0.03, 0.05],
        }
    }

    /// Full: 3×4×2×2×4×3 = 576 combinations
    pub fn full() -> Self {
        Self {
            slope_eps: vec![1e-6, 1e-4, 1e-2],
            max_pivot_age_bars: vec![20, 30, 50, 100],
            use_paired_at_price: vec![true, false],
            require_both_series: vec![true, false],
            take_profit_pcts: vec![0.03, 0.05, 0.10, 0.15],
            stop_loss_pcts: vec![0.02, 0.03, 0.05],
        }
    }

    pub fn generate_configs(&self, base: &Config) -> Vec<Config> {
        iproduct!(
            &self.slope_eps,
            &self.max_pivot_age_bars,
            &self.use_paired_at_price,
            &self.require_both_series,
            &self.take_profit_pcts,
            &self.stop_loss_pcts
        )
        .map(|(eps, age, paired, both, tp, sl)| {
            let mut config = base.clone();
            config.set_strategy_param("slope_eps", serde_json::json!(eps));
            config.set_strategy_param("max_pivot_age_bars", serde_json::json!(age));
            config.set_strategy_param("use_paired_at_price", serde_json::json!(paired));
            config.set_strategy_param("require_both_series", serde_json::json!(both));
            config.set_strategy_param("take_profit_pct", serde_json::json!(tp));
            config.set_strategy_param("stop_loss_pct", serde_json::json!(sl));
            config
        })
        .collect()
    }

    pub fn total_combinations(&self) -> usize {
        self.slope_eps.len()
            * self.max_pivot_age_bars.len()
            * self.use_paired_at_price.len()
            * self.require_both_series.len()
            * self.take_profit_pcts.len()
            * self.stop_loss_pcts.len()
    }
}
