//! Position state machine driven by divergence flags
//!
//! Flat + bullish opens a bracketed long, flat + bearish a bracketed short.
//! A long closes on bearish divergence and a short on bullish divergence,
//! cancelling the outstanding take-profit/stop-loss legs first.

use tracing::{debug, info, warn};

use crate::divergence::DivergenceState;
use crate::oms::{
    BracketHandle, BracketRequest, CancelOutcome, GatewayError, Order, OrderGateway, OrderId,
};
use crate::{PositionSide, Symbol};

use super::config::DivergenceConfig;

/// Order sizing and bracket distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderParams {
    pub position_size: f64,
    pub entry_limit_offset_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub use_market_parent: bool,
    pub max_position_value: Option<f64>,
    pub entry_expiry_bars: Option<u64>,
}

impl From<&DivergenceConfig> for OrderParams {
    fn from(config: &DivergenceConfig) -> Self {
        Self {
            position_size: config.position_size,
            entry_limit_offset_pct: config.entry_limit_offset_pct,
            take_profit_pct: config.take_profit_pct,
            stop_loss_pct: config.stop_loss_pct,
            use_market_parent: config.use_market_parent,
            max_position_value: config.max_position_value,
            entry_expiry_bars: config.entry_expiry_bars,
        }
    }
}

/// What the sequencer did on a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Hold,
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    order: OrderId,
    direction: PositionSide,
    submitted_at: u64,
}

#[derive(Debug, Clone)]
pub struct SignalSequencer {
    symbol: Symbol,
    params: OrderParams,
    state: PositionSide,
    entry: Option<PendingEntry>,
    take_profit: Option<OrderId>,
    stop_loss: Option<OrderId>,
}

impl SignalSequencer {
    pub fn new(symbol: Symbol, params: OrderParams) -> Self {
        Self {
            symbol,
            params,
            state: PositionSide::Flat,
            entry: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Position side as of the last step, including a close requested on it
    pub fn state(&self) -> PositionSide {
        self.state
    }

    pub fn pending_entry(&self) -> Option<OrderId> {
        self.entry.map(|e| e.order)
    }

    /// Tracked take-profit and stop-loss legs
    pub fn children(&self) -> (Option<OrderId>, Option<OrderId>) {
        (self.take_profit, self.stop_loss)
    }

    /// Start from a bracket submitted elsewhere on `bar`, e.g. when resuming
    pub fn track(&mut self, handle: BracketHandle, direction: PositionSide, bar: u64) {
        self.entry = Some(PendingEntry {
            order: handle.parent,
            direction,
            submitted_at: bar,
        });
        self.take_profit = Some(handle.take_profit);
        self.stop_loss = Some(handle.stop_loss);
    }

    /// Drop references to orders that reached a terminal state
    pub fn notify_order(&mut self, order: &Order) {
        if !order.is_complete() {
            return;
        }
        if self.entry.is_some_and(|e| e.order == order.id) {
            self.entry = None;
        }
        if self.take_profit == Some(order.id) {
            self.take_profit = None;
        }
        if self.stop_loss == Some(order.id) {
            self.stop_loss = None;
        }
    }

    /// Evaluate one bar against the gateway's current position
    pub fn step(
        &mut self,
        bar: u64,
        close: f64,
        divergence: DivergenceState,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Transition, GatewayError> {
        let position = gateway.position();
        self.state = position.side;

        match position.side {
            PositionSide::Flat => {
                let direction = if divergence.bullish {
                    PositionSide::Long
                } else if divergence.bearish {
                    PositionSide::Short
                } else {
                    return Ok(Transition::Hold);
                };
                self.open(bar, close, direction, gateway)
            }
            PositionSide::Long if divergence.bearish => {
                self.cancel_children(gateway);
                gateway.close_position(position.size)?;
                self.entry = None;
                self.state = PositionSide::Flat;
                info!(symbol = %self.symbol, bar, close, "Bearish divergence exit (closed long)");
                Ok(Transition::CloseLong)
            }
            PositionSide::Short if divergence.bullish => {
                self.cancel_children(gateway);
                gateway.close_position(position.size)?;
                self.entry = None;
                self.state = PositionSide::Flat;
                info!(symbol = %self.symbol, bar, close, "Bullish divergence exit (closed short)");
                Ok(Transition::CloseShort)
            }
            _ => Ok(Transition::Hold),
        }
    }

    fn open(
        &mut self,
        bar: u64,
        close: f64,
        direction: PositionSide,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Transition, GatewayError> {
        if let Some(pending) = self.entry {
            let expired = self
                .params
                .entry_expiry_bars
                .is_some_and(|n| bar.saturating_sub(pending.submitted_at) >= n);
            if pending.direction == direction && !expired {
                debug!(symbol = %self.symbol, bar, order_id = pending.order, "Entry still pending");
                return Ok(Transition::Hold);
            }
            if expired {
                info!(
                    symbol = %self.symbol,
                    bar,
                    order_id = pending.order,
                    submitted_at = pending.submitted_at,
                    "Entry expired unfilled, re-placing"
                );
            }
            // Opposite signal or stale entry that never filled
            self.cancel_pending(gateway);
        }

        let size = self.params.position_size;
        if let Some(max_value) = self.params.max_position_value {
            if size * close > max_value {
                warn!(
                    symbol = %self.symbol,
                    bar,
                    value = size * close,
                    max_value,
                    "Entry skipped: position value above limit"
                );
                return Ok(Transition::Hold);
            }
        }

        let p = &self.params;
        let entry = close * (1.0 + p.entry_limit_offset_pct);
        let (take_profit, stop_loss) = match direction {
            PositionSide::Short => (
                close * (1.0 - p.take_profit_pct),
                close * (1.0 + p.stop_loss_pct),
            ),
            _ => (
                close * (1.0 + p.take_profit_pct),
                close * (1.0 - p.stop_loss_pct),
            ),
        };
        let request = BracketRequest::new(
            self.symbol.clone(),
            size,
            entry,
            take_profit,
            stop_loss,
            p.use_market_parent,
        );

        let (handle, transition) = match direction {
            PositionSide::Short => (gateway.open_short(request)?, Transition::OpenShort),
            _ => (gateway.open_long(request)?, Transition::OpenLong),
        };
        self.track(handle, direction, bar);

        info!(
            symbol = %self.symbol,
            bar,
            side = %direction,
            parent_price = entry,
            market_parent = self.params.use_market_parent,
            tp = take_profit,
            sl = stop_loss,
            "Submitted bracket"
        );
        Ok(transition)
    }

    fn cancel_children(&mut self, gateway: &mut dyn OrderGateway) {
        for slot in [&mut self.take_profit, &mut self.stop_loss] {
            if let Some(id) = slot.take() {
                if gateway.cancel(id) == CancelOutcome::AlreadyGone {
                    info!(symbol = %self.symbol, order_id = id, "Child order already gone");
                }
            }
        }
    }

    fn cancel_pending(&mut self, gateway: &mut dyn OrderGateway) {
        if let Some(pending) = self.entry.take() {
            if gateway.cancel(pending.order) == CancelOutcome::AlreadyGone {
                info!(symbol = %self.symbol, order_id = pending.order, "Entry order already gone");
            }
        }
        self.cancel_children(gateway);
    }
}
