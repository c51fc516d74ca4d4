//! Backtesting engine
//!
//! Steps a strategy through historical bars against a [`SimulatedBroker`].
//! Each bar: broker fills → strategy notifications → `on_bar` → equity mark.
//! Orders placed on a bar can first fill on the next one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::info;

use crate::oms::{OrderGateway, PositionSnapshot, SimulatedBroker};
use crate::strategies::{create_strategy, Strategy};
use crate::{Candle, Config, ExitReason, PerformanceMetrics, Symbol, Trade};

/// Single-symbol backtester
pub struct Backtester {
    symbol: Symbol,
    strategy: Box<dyn Strategy>,
    broker: SimulatedBroker,
    initial_capital: f64,
    periods_per_year: f64,
    bar: u64,
    trades: Vec<Trade>,
    equity_curve: Vec<(DateTime<Utc>, f64)>,
    last_candle: Option<Candle>,
}

impl Backtester {
    pub fn new(config: &Config, symbol: Symbol, mut strategy: Box<dyn Strategy>) -> Self {
        strategy.init();
        let trading = &config.trading;
        Self {
            broker: SimulatedBroker::new(
                symbol.clone(),
                trading.initial_capital,
                trading.commission,
                trading.slippage,
            ),
            symbol,
            strategy,
            initial_capital: trading.initial_capital,
            periods_per_year: config.backtest.periods_per_year,
            bar: 0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            last_candle: None,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn bars_processed(&self) -> u64 {
        self.bar
    }

    pub fn position(&self) -> PositionSnapshot {
        self.broker.position()
    }

    /// Latest marked account value
    pub fn equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.initial_capital, |(_, e)| *e)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Process one bar
    pub fn step(&mut self, candle: &Candle) -> Result<()> {
        self.bar += 1;
        self.broker.process_bar(self.bar, candle);
        self.dispatch_events();

        self.strategy
            .on_bar(candle, &mut self.broker)
            .with_context(|| format!("{} failed on bar {}", self.strategy.name(), self.bar))?;
        self.dispatch_events();

        self.equity_curve
            .push((candle.datetime, self.broker.equity(candle.close)));
        self.last_candle = Some(candle.clone());
        Ok(())
    }

    fn dispatch_events(&mut self) {
        for order in self.broker.drain_order_events() {
            self.strategy.notify_order(&order);
        }
        for trade in self.broker.drain_closed_trades() {
            self.strategy.notify_trade(&trade);
            self.trades.push(trade);
        }
    }

    /// Step through all bars, then close out
    pub fn run(mut self, candles: &[Candle]) -> Result<BacktestResult> {
        for candle in candles {
            self.step(candle)?;
        }
        Ok(self.finish())
    }

    /// Close any open position at the last close and compute metrics
    pub fn finish(mut self) -> BacktestResult {
        if let Some(last) = self.last_candle.take() {
            self.broker.close_all(last.close, ExitReason::EndOfData);
            self.dispatch_events();
            let final_equity = self.broker.equity(last.close);
            if let Some(point) = self.equity_curve.last_mut() {
                point.1 = final_equity;
            }
        }

        let metrics = calculate_metrics(
            &self.trades,
            &self.equity_curve,
            self.initial_capital,
            self.periods_per_year,
            self.broker.total_commission(),
        );

        info!(
            symbol = %self.symbol,
            bars = self.bar,
            trades = self.trades.len(),
            total_return = format!("{:.2}%", metrics.total_return),
            "Backtest finished"
        );

        BacktestResult {
            symbol: self.symbol,
            bars: self.bar,
            trades: self.trades,
            equity_curve: self.equity_curve,
            metrics,
        }
    }
}

/// Performance statistics from closed trades and the per-bar equity curve
pub fn calculate_metrics(
    trades: &[Trade],
    equity_curve: &[(DateTime<Utc>, f64)],
    initial_capital: f64,
    periods_per_year: f64,
    total_commission: f64,
) -> PerformanceMetrics {
    let final_capital = equity_curve.last().map_or(initial_capital, |(_, e)| *e);
    let total_return = if initial_capital > 0.0 {
        (final_capital - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    };

    let winning_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl > 0.0).collect();
    let losing_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl <= 0.0).collect();

    let win_rate = if !trades.is_empty() {
        (winning_trades.len() as f64 / trades.len() as f64) * 100.0
    } else {
        0.0
    };

    let gross_profits: f64 = winning_trades.iter().map(|t| t.net_pnl).sum();
    let gross_losses: f64 = losing_trades.iter().map(|t| t.net_pnl.abs()).sum();

    let profit_factor = if gross_losses > 0.0 {
        gross_profits / gross_losses
    } else if gross_profits > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win = if !winning_trades.is_empty() {
        gross_profits / winning_trades.len() as f64
    } else {
        0.0
    };
    let avg_loss = if !losing_trades.is_empty() {
        gross_losses / losing_trades.len() as f64
    } else {
        0.0
    };

    let largest_win = winning_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::max);
    let largest_loss = losing_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::min);

    let mut peak = initial_capital;
    let mut max_dd = 0.0;
    for (_, equity) in equity_curve {
        if *equity > peak {
            peak = *equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].1 != 0.0)
        .map(|w| (w[1].1 - w[0].1) / w[0].1)
        .collect();
    let sharpe_ratio = if returns.len() > 1 {
        let mean = returns.iter().mean();
        let std_dev = returns.iter().std_dev();
        if std_dev > 0.0 && std_dev.is_finite() {
            mean / std_dev * periods_per_year.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    PerformanceMetrics {
        start_value: initial_capital,
        end_value: final_capital,
        total_return,
        sharpe_ratio,
        max_drawdown: max_dd * 100.0,
        win_rate,
        profit_factor,
        total_trades: trades.len(),
        winning_trades: winning_trades.len(),
        losing_trades: losing_trades.len(),
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        total_commission,
    }
}

/// Outcome of one symbol's backtest
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub symbol: Symbol,
    pub bars: u64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub metrics: PerformanceMetrics,
}

/// Backtest every symbol independently, in parallel; results sorted by symbol
pub fn run_symbols(
    config: &Config,
    data: HashMap<Symbol, Vec<Candle>>,
) -> Result<Vec<BacktestResult>> {
    let mut results = data
        .into_par_iter()
        .map(|(symbol, candles)| {
            let strategy = create_strategy(config, &symbol)?;
            Backtester::new(config, symbol, strategy).run(&candles)
        })
        .collect::<Result<Vec<_>>>()?;
    results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn curve(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::days(i as i64), *v))
            .collect()
    }

    fn trade(net_pnl: f64) -> Trade {
        let now = Utc::now();
        Trade {
            symbol: Symbol::new("NQ"),
            side: crate::Side::Buy,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl,
            quantity: 1.0,
            entry_time: now,
            exit_time: now,
            pnl: net_pnl,
            commission: 0.0,
            net_pnl,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn test_drawdown_and_return() {
        let metrics = calculate_metrics(
            &[],
            &curve(&[100.0, 120.0, 90.0, 110.0]),
            100.0,
            252.0,
            0.0,
        );
        assert_relative_eq!(metrics.total_return, 10.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.max_drawdown, 25.0, epsilon = 1e-9);
        assert_eq!(metrics.total_trades, 0);
    }

    #[test]
    fn test_trade_statistics() {
        let trades = [trade(10.0), trade(-5.0), trade(20.0)];
        let metrics = calculate_metrics(&trades, &curve(&[100.0, 125.0]), 100.0, 252.0, 0.0);
        assert_relative_eq!(metrics.win_rate, 200.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.profit_factor, 6.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.avg_win, 15.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.largest_loss, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_equity_has_zero_sharpe() {
        let metrics = calculate_metrics(&[], &curve(&[100.0; 10]), 100.0, 252.0, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_sharpe_sign_follows_drift() {
        let equity = curve(&[100.0, 101.0, 101.5, 102.7, 103.0]);
        let up = calculate_metrics(&[], &equity, 100.0, 252.0, 0.0);
        assert!(up.sharpe_ratio > 0.0);
    }
}
