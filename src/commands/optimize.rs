//! Optimize command implementation with progress tracking

use anyhow::{bail, Result};
use divergence_trader::optimizer::Optimizer;
use divergence_trader::strategies::divergence::{format_params, GridParams};
use divergence_trader::{data, Config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

pub fn run(
    config_path: String,
    mode: String,
    sort_by: String,
    top: usize,
    sequential: bool,
) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let grid = match mode.as_str() {
        "quick" => GridParams::quick(),
        "full" => GridParams::full(),
        other => bail!("Unknown optimization mode '{}', expected quick or full", other),
    };

    let start = config
        .backtest
        .start_date
        .as_deref()
        .map(data::parse_date)
        .transpose()?;
    let end = config
        .backtest
        .end_date
        .as_deref()
        .map(data::parse_date)
        .transpose()?;
    let data = data::load_multi_symbol(
        &config.backtest.data_dir,
        &config.symbols(),
        config.timeframe(),
        start,
        end,
    )?;

    let configs = grid.generate_configs(&config);

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Symbols:       {}", data.len());
    println!("  Timeframe:     {}", config.timeframe());
    println!("  Mode:          {}", mode);
    println!("  Parameters:    {} combinations", grid.total_combinations());
    println!("{}\n", "=".repeat(70));

    let optimizer = Optimizer::new(data);
    let mut results = if sequential {
        optimizer.optimize_sequential(&configs)
    } else {
        let pb = ProgressBar::new(configs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec}]")?
                .progress_chars("█░ "),
        );
        let results = optimizer.optimize(&configs, Some(&pb));
        pb.finish_with_message(format!("{} valid", results.len()));
        results
    };
    println!();

    if results.is_empty() {
        info!("No valid results found.");
        return Ok(());
    }

    Optimizer::sort_results(&mut results, &sort_by);
    info!("Total results: {}, sorted by: {}", results.len(), sort_by);

    let display_count = top.min(results.len());
    println!("\n{}", "=".repeat(110));
    println!(
        "TOP {} OPTIMIZATION RESULTS (sorted by {})",
        display_count, sort_by
    );
    println!("{}", "=".repeat(110));
    println!(
        "{:<4} {:>7} {:>9} {:>8} {:>8} {:>6} {:>7} | Parameters",
        "Rank", "Sharpe", "Return%", "MaxDD%", "WinR%", "Trades", "PF"
    );
    println!("{}", "-".repeat(110));
    for (i, result) in results.iter().take(top).enumerate() {
        println!(
            "{:<4} {:>7.2} {:>9.2} {:>8.2} {:>8.2} {:>6} {:>7.2} | {}",
            i + 1,
            result.sharpe_ratio,
            result.total_return,
            result.max_drawdown,
            result.win_rate,
            result.total_trades,
            result.profit_factor,
            format_params(&result.params)
        );
    }
    println!("{}", "=".repeat(110));

    info!("Optimization completed successfully");
    Ok(())
}
