//! Backtest command implementation

use anyhow::Result;
use divergence_trader::backtest::{run_symbols, BacktestResult};
use divergence_trader::{data, report, Config};
use tracing::{debug, info};

pub struct BacktestArgs {
    pub config_path: String,
    pub strategy: Option<String>,
    pub capital: Option<f64>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub symbols: Option<String>,
    pub no_report: bool,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    if let Some(strategy) = args.strategy {
        info!("Overriding strategy to: {}", strategy);
        config.strategy_name = strategy;
    }

    if let Some(capital) = args.capital {
        info!("Overriding initial capital to: {:.2}", capital);
        config.trading.initial_capital = capital;
    }

    if let Some(symbols) = args.symbols {
        config.trading.symbols = symbols
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let start = args
        .start
        .or_else(|| config.backtest.start_date.clone())
        .map(|s| data::parse_date(&s))
        .transpose()?;
    let end = args
        .end
        .or_else(|| config.backtest.end_date.clone())
        .map(|s| data::parse_date(&s))
        .transpose()?;

    info!("Loading data from: {}", config.backtest.data_dir);
    let symbols = config.symbols();
    debug!("Symbols: {:?}", symbols);
    let data = data::load_multi_symbol(
        &config.backtest.data_dir,
        &symbols,
        config.timeframe(),
        start,
        end,
    )?;
    info!("Loaded data for {} symbols", data.len());

    info!("Running backtest with strategy: {}", config.strategy_name);
    let results = run_symbols(&config, data)?;

    for result in &results {
        print_results(&config, result);
    }

    if config.backtest.write_report && !args.no_report {
        let run_dir = report::save_results(&config.backtest.results_dir, &config, &results)?;
        println!("Report written to {}", run_dir.display());
    }

    info!("Backtest completed successfully");
    Ok(())
}

fn print_results(config: &Config, result: &BacktestResult) {
    let m = &result.metrics;
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", result.symbol);
    println!("{}", "=".repeat(60));
    println!("Bars:               {}", result.bars);
    println!("Initial Capital:    {:.2}", config.trading.initial_capital);
    println!("Final Value:        {:.2}", m.end_value);
    println!("Total Return:       {:.2}%", m.total_return);
    println!("Sharpe Ratio:       {:.2}", m.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", m.max_drawdown);
    println!("Win Rate:           {:.2}%", m.win_rate);
    println!("Profit Factor:      {:.2}", m.profit_factor);
    println!("Total Trades:       {}", m.total_trades);
    println!("Winning Trades:     {}", m.winning_trades);
    println!("Losing Trades:      {}", m.losing_trades);
    println!("Average Win:        {:.2}", m.avg_win);
    println!("Average Loss:       {:.2}", m.avg_loss);
    println!("Largest Win:        {:.2}", m.largest_win);
    println!("Largest Loss:       {:.2}", m.largest_loss);
    println!("{}", "-".repeat(60));
    println!("Total Commission:   {:.2}", m.total_commission);
    println!("{}", "=".repeat(60));
}
