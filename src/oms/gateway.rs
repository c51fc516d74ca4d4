//! The order/position boundary between a strategy and whatever executes it

use thiserror::Error;

use super::types::{
    BracketHandle, BracketRequest, CancelOutcome, OrderId, OrderIntent, PositionSnapshot,
};

#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("order quantity must be positive, got {0}")]
    InvalidQuantity(f64),

    #[error("invalid {name} price: {value}")]
    InvalidPrice { name: &'static str, value: f64 },

    #[error("gateway trades {expected}, request was for {got}")]
    SymbolMismatch { expected: String, got: String },

    #[error("no open position to close")]
    NoPosition,
}

/// Execution side of the strategy: accepts intents, reports the position.
///
/// One gateway serves one instrument.
pub trait OrderGateway {
    fn open_long(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError>;

    fn open_short(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError>;

    /// Close `size` units of the current position at market
    fn close_position(&mut self, size: f64) -> Result<OrderId, GatewayError>;

    /// Best-effort cancel; never fails
    fn cancel(&mut self, order: OrderId) -> CancelOutcome;

    fn position(&self) -> PositionSnapshot;
}

/// Gateway that executes nothing and records every intent.
///
/// The reported position only changes through [`RecordingGateway::set_position`].
#[derive(Debug, Default)]
pub struct RecordingGateway {
    intents: Vec<OrderIntent>,
    position: PositionSnapshot,
    next_id: OrderId,
    live: Vec<OrderId>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn with_position(position: PositionSnapshot) -> Self {
        let mut gateway = Self::new();
        gateway.position = position;
        gateway
    }

    pub fn set_position(&mut self, position: PositionSnapshot) {
        self.position = position;
    }

    pub fn intents(&self) -> &[OrderIntent] {
        &self.intents
    }

    pub fn take_intents(&mut self) -> Vec<OrderIntent> {
        std::mem::take(&mut self.intents)
    }

    fn allocate(&mut self) -> OrderId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.live.push(id);
        id
    }

    fn bracket(&mut self) -> BracketHandle {
        BracketHandle {
            parent: self.allocate(),
            take_profit: self.allocate(),
            stop_loss: self.allocate(),
        }
    }
}

impl OrderGateway for RecordingGateway {
    fn open_long(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError> {
        self.intents.push(OrderIntent::OpenLong(request));
        Ok(self.bracket())
    }

    fn open_short(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError> {
        self.intents.push(OrderIntent::OpenShort(request));
        Ok(self.bracket())
    }

    fn close_position(&mut self, size: f64) -> Result<OrderId, GatewayError> {
        self.intents.push(OrderIntent::ClosePosition { size });
        Ok(self.allocate())
    }

    fn cancel(&mut self, order: OrderId) -> CancelOutcome {
        self.intents.push(OrderIntent::Cancel(order));
        match self.live.iter().position(|id| *id == order) {
            Some(idx) => {
                self.live.swap_remove(idx);
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::AlreadyGone,
        }
    }

    fn position(&self) -> PositionSnapshot {
        self.position
    }
}
