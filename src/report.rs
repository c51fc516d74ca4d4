//! Backtest run reports
//!
//! Each run gets its own `run_<YYYYmmdd_HHMMSS>` directory holding
//! `report.md`, `results.json` and `trades.csv`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backtest::BacktestResult;
use crate::{Config, PerformanceMetrics, Symbol};

#[derive(Serialize)]
struct SymbolSummary<'a> {
    symbol: &'a Symbol,
    bars: u64,
    metrics: &'a PerformanceMetrics,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    strategy_name: &'a str,
    timeframe: &'a str,
    strategy: &'a serde_json::Value,
    results: Vec<SymbolSummary<'a>>,
}

/// Write a timestamped run directory under `results_dir`; returns its path
pub fn save_results(
    results_dir: impl AsRef<Path>,
    config: &Config,
    results: &[BacktestResult],
) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let run_dir = results_dir.as_ref().join(format!("run_{}", stamp));
    write_run(&run_dir, config, results)?;
    info!("Saved results to {}", run_dir.display());
    Ok(run_dir)
}

/// Write the report files into `run_dir`, creating it if needed
pub fn write_run(run_dir: &Path, config: &Config, results: &[BacktestResult]) -> Result<()> {
    fs::create_dir_all(run_dir)
        .with_context(|| format!("Failed to create {}", run_dir.display()))?;

    let summary = RunSummary {
        strategy_name: &config.strategy_name,
        timeframe: config.timeframe(),
        strategy: &config.strategy,
        results: results
            .iter()
            .map(|r| SymbolSummary {
                symbol: &r.symbol,
                bars: r.bars,
                metrics: &r.metrics,
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize results")?;
    fs::write(run_dir.join("results.json"), json).context("Failed to write results.json")?;

    fs::write(run_dir.join("report.md"), render_markdown(config, results))
        .context("Failed to write report.md")?;

    let mut writer = csv::Writer::from_path(run_dir.join("trades.csv"))
        .context("Failed to create trades.csv")?;
    for trade in results.iter().flat_map(|r| &r.trades) {
        writer.serialize(trade).context("Failed to write trade")?;
    }
    writer.flush().context("Failed to flush trades.csv")?;

    Ok(())
}

/// Markdown summary of a run
pub fn render_markdown(config: &Config, results: &[BacktestResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Backtest Report\n");
    let _ = writeln!(out, "- Strategy: `{}`", config.strategy_name);
    let _ = writeln!(out, "- Timeframe: `{}`", config.timeframe());
    let _ = writeln!(
        out,
        "- Initial capital: {:.2}\n",
        config.trading.initial_capital
    );

    let _ = writeln!(
        out,
        "| Symbol | Bars | Return % | Sharpe | Max DD % | Trades | Win % | Profit Factor |"
    );
    let _ = writeln!(out, "|---|---:|---:|---:|---:|---:|---:|---:|");
    for r in results {
        let m = &r.metrics;
        let _ = writeln!(
            out,
            "| {} | {} | {:.2} | {:.2} | {:.2} | {} | {:.1} | {:.2} |",
            r.symbol,
            r.bars,
            m.total_return,
            m.sharpe_ratio,
            m.max_drawdown,
            m.total_trades,
            m.win_rate,
            m.profit_factor
        );
    }

    let _ = writeln!(out, "\n## Parameters\n");
    let _ = writeln!(out, "```json");
    let _ = writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&config.strategy).unwrap_or_default()
    );
    let _ = writeln!(out, "```");
    out
}
