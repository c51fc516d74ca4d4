//! Paper command: bar-by-bar replay through the simulated broker

use anyhow::{Context, Result};
use divergence_trader::backtest::Backtester;
use divergence_trader::strategies::create_strategy;
use divergence_trader::{data, Config, Symbol};
use std::time::Duration;
use tracing::info;

pub fn run(config_path: String, symbol: Option<String>, delay_ms: u64) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let symbol = match symbol {
        Some(s) => Symbol::new(s.trim()),
        None => config
            .symbols()
            .into_iter()
            .next()
            .context("No symbol configured")?,
    };

    let path = data::data_file(&config.backtest.data_dir, &symbol, config.timeframe());
    let candles = data::load_csv(&path)?;
    info!("Replaying {} bars for {}", candles.len(), symbol);

    let strategy = create_strategy(&config, &symbol)?;
    let mut trader = Backtester::new(&config, symbol.clone(), strategy);
    let mut last_position = trader.position();

    for candle in &candles {
        trader.step(candle)?;

        let position = trader.position();
        if position != last_position {
            println!(
                "{} {} close={:.2} position={} size={:.4} equity={:.2}",
                candle.datetime.format("%Y-%m-%d %H:%M"),
                symbol,
                candle.close,
                position.side,
                position.size,
                trader.equity()
            );
            last_position = position;
        }

        if delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
    }

    let result = trader.finish();
    println!("\n{}", "=".repeat(60));
    println!("PAPER REPLAY: {}", result.symbol);
    println!("{}", "=".repeat(60));
    println!("Bars:               {}", result.bars);
    println!("Final Value:        {:.2}", result.metrics.end_value);
    println!("Total Return:       {:.2}%", result.metrics.total_return);
    println!("Total Trades:       {}", result.metrics.total_trades);
    println!("{}", "=".repeat(60));
    Ok(())
}
