//! Order Management System (OMS)
//!
//! The boundary a strategy trades through:
//! - Abstract intents (bracketed entries, market exits, cancels)
//! - Position read-back
//! - A bar-driven simulated broker for backtests and paper runs

pub mod gateway;
pub mod simulated;
pub mod types;

pub use gateway::{GatewayError, OrderGateway, RecordingGateway};
pub use simulated::SimulatedBroker;
pub use types::{
    BracketHandle, BracketRequest, CancelOutcome, Order, OrderId, OrderIntent, OrderRole,
    OrderState, OrderType, PositionSnapshot,
};
