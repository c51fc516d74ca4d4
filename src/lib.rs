//! Divergence Trader
//!
//! Swing-pivot divergence trading between a momentum oscillator and a trend
//! series, with bracket-order execution, backtesting, paper replay and
//! parameter optimization.
//!
//! The signal pipeline is built from small streaming parts:
//! - [`swing`]: centred-window swing high/low detection
//! - [`pivots`]: the last two confirmed pivots per side and their slopes
//! - [`paired`]: companion-series slopes measured at reference pivot bars
//! - [`divergence`]: bullish/bearish classification from the four slopes
//! - [`strategies::divergence`]: the engine and order sequencer that turn
//!   divergence into bracket orders through an [`oms::OrderGateway`]

pub mod backtest;
pub mod config;
pub mod data;
pub mod divergence;
pub mod indicators;
pub mod oms;
pub mod optimizer;
pub mod paired;
pub mod pivots;
pub mod report;
pub mod strategies;
pub mod swing;
pub mod types;

pub use config::Config;
pub use types::*;
