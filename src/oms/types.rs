//! Core OMS types
//!
//! Defines orders, bracket requests, position snapshots and the abstract
//! intents a strategy emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PositionSide, Side, Symbol};

/// Order ID type, unique within one gateway
pub type OrderId = u64;

/// Order type - determines execution logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at the next available open
    Market,

    /// Buy limit: executes when price ≤ limit price
    /// Sell limit: executes when price ≥ limit price
    Limit,

    /// Buy stop: triggers when price ≥ stop price
    /// Sell stop: triggers when price ≤ stop price
    Stop,
}

/// What an order is for within a bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    Entry,
    TakeProfit,
    StopLoss,
    Exit,
}

/// Order state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Bracket child waiting for its parent to fill
    Pending,

    /// Working in the book
    Open,

    /// Completely filled
    Filled,

    /// Cancelled by the strategy or by OCO
    Cancelled,

    /// Refused by the gateway
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub role: OrderRole,
    /// Limit or stop price; `None` for market orders
    pub price: Option<f64>,
    pub quantity: f64,
    pub state: OrderState,
    /// Entry order this child belongs to
    pub parent_id: Option<OrderId>,
    pub filled_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        role: OrderRole,
        price: Option<f64>,
        quantity: f64,
        parent_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = if parent_id.is_some() {
            OrderState::Pending
        } else {
            OrderState::Open
        };
        Self {
            id,
            symbol,
            side,
            order_type,
            role,
            price,
            quantity,
            state,
            parent_id,
            filled_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open or waiting on a parent
    pub fn is_active(&self) -> bool {
        matches!(self.state, OrderState::Open | OrderState::Pending)
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

/// Entry with attached take-profit and stop-loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketRequest {
    pub symbol: Symbol,
    pub quantity: f64,
    /// Limit price of the parent; `None` submits a market parent
    pub entry_price: Option<f64>,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

impl BracketRequest {
    pub fn new(
        symbol: Symbol,
        quantity: f64,
        entry_price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
        use_market_entry: bool,
    ) -> Self {
        Self {
            symbol,
            quantity,
            entry_price: (!use_market_entry).then_some(entry_price),
            take_profit_price,
            stop_loss_price,
        }
    }

    pub fn uses_market_entry(&self) -> bool {
        self.entry_price.is_none()
    }
}

/// Ids of the three legs of a submitted bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketHandle {
    pub parent: OrderId,
    pub take_profit: OrderId,
    pub stop_loss: OrderId,
}

/// Result of a cancel request; neither outcome is an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    Cancelled,
    /// Already filled, cancelled, or never known
    AlreadyGone,
}

/// Current position as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub side: PositionSide,
    pub size: f64,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn long(size: f64) -> Self {
        Self {
            side: PositionSide::Long,
            size,
        }
    }

    pub fn short(size: f64) -> Self {
        Self {
            side: PositionSide::Short,
            size,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }
}

/// Abstract order actions, in the order a strategy emitted them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    OpenLong(BracketRequest),
    OpenShort(BracketRequest),
    ClosePosition { size: f64 },
    Cancel(OrderId),
}
