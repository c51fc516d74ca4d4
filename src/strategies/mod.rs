//! Trading Strategies Module
//!
//! Strategy framework with:
//! - A trait interface every strategy implements
//! - A static name → factory registry

pub mod divergence;

use crate::oms::{Order, OrderGateway, OrderState};
use crate::{Candle, Config, Symbol, Trade};
use anyhow::Result;

// =============================================================================
// Strategy Trait - The contract all strategies must implement
// =============================================================================

/// Trading strategy driven one bar at a time.
///
/// A strategy instance trades exactly one symbol; callers that run several
/// symbols create one instance per symbol.
pub trait Strategy: Send {
    /// Strategy identifier (must match config's strategy_name)
    fn name(&self) -> &'static str;

    /// Process a closed bar and emit orders through `gateway`
    fn on_bar(&mut self, candle: &Candle, gateway: &mut dyn OrderGateway) -> Result<()>;

    /// Notification when an order state changes
    fn notify_order(&mut self, order: &Order) {
        match order.state {
            OrderState::Filled => {
                tracing::debug!(
                    symbol = %order.symbol,
                    side = ?order.side,
                    price = ?order.filled_price,
                    size = order.quantity,
                    "Order executed"
                );
            }
            OrderState::Cancelled | OrderState::Rejected => {
                tracing::debug!(
                    symbol = %order.symbol,
                    state = ?order.state,
                    "Order closed unfilled"
                );
            }
            _ => {}
        }
    }

    /// Notification when a trade is closed
    fn notify_trade(&mut self, trade: &Trade) {
        tracing::debug!(
            symbol = %trade.symbol,
            pnl = trade.net_pnl,
            return_pct = format!("{:.2}%", trade.return_pct()),
            "Trade closed"
        );
    }

    /// Initialize strategy (called once before trading starts)
    fn init(&mut self) {}
}

// =============================================================================
// Strategy Registry
// =============================================================================

/// Factory function type for creating a strategy for one symbol
pub type StrategyFactory = fn(&Config, &Symbol) -> Result<Box<dyn Strategy>>;

static REGISTRY: &[(&str, StrategyFactory)] = &[("divergence", divergence::create)];

/// Create a strategy for `symbol` from configuration
pub fn create_strategy(config: &Config, symbol: &Symbol) -> Result<Box<dyn Strategy>> {
    let strategy_name = config.strategy_name.as_str();
    let factory = REGISTRY
        .iter()
        .find(|(name, _)| *name == strategy_name)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown strategy: '{}'. Available: {}",
                strategy_name,
                available_strategies().join(", ")
            )
        })?;

    factory(config, symbol)
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}
