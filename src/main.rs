//! Divergence trader - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Run strategy backtests
//! - optimize: Grid-search strategy parameters
//! - paper: Replay historical bars through the simulated broker

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing::Subscriber;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "divergence-trader")]
#[command(
    about = "Swing-pivot divergence strategy with backtesting, optimization and paper replay",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/divergence.json")]
        config: String,

        /// Strategy name (overrides config file)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Symbols to test (comma-separated), overrides config
        #[arg(long)]
        symbols: Option<String>,

        /// Skip writing the report directory
        #[arg(long)]
        no_report: bool,
    },

    /// Optimize strategy parameters (grid search)
    Optimize {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/divergence.json")]
        config: String,

        /// Grid size: quick or full
        #[arg(short, long, default_value = "quick")]
        mode: String,

        /// Sort results by metric (sharpe, return, win_rate, profit_factor)
        #[arg(long, default_value = "sharpe")]
        sort_by: String,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Replay historical bars one at a time against the simulated broker
    Paper {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/divergence.json")]
        config: String,

        /// Symbol to replay (defaults to the first configured symbol)
        #[arg(long)]
        symbol: Option<String>,

        /// Delay between bars in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },
}

/// Plain-text file layer, stackable on any registry-based subscriber
fn file_layer<S>(writer: RollingFileAppender) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Console stays clean for the progress bar
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer(file_appender))
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer(file_appender))
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
        Commands::Paper { .. } => ("paper", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            strategy,
            capital,
            start,
            end,
            symbols,
            no_report,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: config,
            strategy,
            capital,
            start,
            end,
            symbols,
            no_report,
        }),

        Commands::Optimize {
            config,
            mode,
            sort_by,
            top,
            sequential,
        } => commands::optimize::run(config, mode, sort_by, top, sequential),

        Commands::Paper {
            config,
            symbol,
            delay_ms,
        } => commands::paper::run(config, symbol, delay_ms),
    }
}
