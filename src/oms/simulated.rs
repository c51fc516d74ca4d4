//! Bar-driven broker simulation with bracket orders
//!
//! Orders submitted while bar `t` is being processed become eligible on bar
//! `t+1`. Bracket children wait for their parent, activate on the bar after
//! the parent fills, and cancel each other on fill (OCO). When both children
//! could fill inside one bar the stop-loss is assumed to have come first.
//!
//! Only working orders are stored. Filled and cancelled orders are reported
//! through [`SimulatedBroker::drain_order_events`] and then dropped.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::oms::gateway::{GatewayError, OrderGateway};
use crate::oms::types::{
    BracketHandle, BracketRequest, CancelOutcome, Order, OrderId, OrderRole, OrderState,
    OrderType, PositionSnapshot,
};
use crate::{Candle, ExitReason, PositionSide, Side, Symbol, Trade};

#[derive(Debug, Clone)]
struct WorkingOrder {
    order: Order,
    /// First bar on which the order may fill
    active_from: u64,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    side: PositionSide,
    size: f64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    /// Entry commission not yet attributed to a closed trade
    entry_commission: f64,
}

/// Single-instrument simulated broker
#[derive(Debug)]
pub struct SimulatedBroker {
    symbol: Symbol,
    initial_capital: f64,
    commission_rate: f64,
    slippage: f64,
    /// Pending and open orders only
    orders: Vec<WorkingOrder>,
    next_id: OrderId,
    bar: u64,
    now: DateTime<Utc>,
    position: Option<OpenPosition>,
    realized_pnl: f64,
    total_commission: f64,
    order_events: Vec<Order>,
    closed_trades: Vec<Trade>,
}

impl SimulatedBroker {
    pub fn new(symbol: Symbol, initial_capital: f64, commission_rate: f64, slippage: f64) -> Self {
        Self {
            symbol,
            initial_capital,
            commission_rate,
            slippage,
            orders: Vec::new(),
            next_id: 1,
            bar: 0,
            now: DateTime::<Utc>::MIN_UTC,
            position: None,
            realized_pnl: 0.0,
            total_commission: 0.0,
            order_events: Vec::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Account value with the open position marked at `price`
    pub fn equity(&self, price: f64) -> f64 {
        let unrealized = self.position.as_ref().map_or(0.0, |p| {
            let open_cost = p.entry_commission;
            match p.side {
                PositionSide::Long => (price - p.entry_price) * p.size - open_cost,
                PositionSide::Short => (p.entry_price - price) * p.size - open_cost,
                PositionSide::Flat => 0.0,
            }
        });
        self.initial_capital + self.realized_pnl + unrealized
    }

    /// A working order by id; `None` once it has filled or been cancelled
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|w| w.order.id == id).map(|w| &w.order)
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().map(|w| &w.order)
    }

    /// Number of orders held by the broker
    pub fn stored_orders(&self) -> usize {
        self.orders.len()
    }

    /// Order state changes since the last drain, in the order they happened
    pub fn drain_order_events(&mut self) -> Vec<Order> {
        std::mem::take(&mut self.order_events)
    }

    /// Trades closed since the last drain
    pub fn drain_closed_trades(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.closed_trades)
    }

    /// Match working orders against `candle`, the bar numbered `bar`.
    ///
    /// Orders submitted after this call are eligible from `bar + 1`.
    pub fn process_bar(&mut self, bar: u64, candle: &Candle) {
        self.bar = bar;
        self.now = candle.datetime;

        // Parents and exits first, then stop-losses ahead of take-profits
        let mut eligible: Vec<(u8, usize)> = self
            .orders
            .iter()
            .enumerate()
            .filter(|(_, w)| w.order.state == OrderState::Open && w.active_from <= bar)
            .map(|(idx, w)| {
                let rank = match w.order.role {
                    OrderRole::Entry | OrderRole::Exit => 0,
                    OrderRole::StopLoss => 1,
                    OrderRole::TakeProfit => 2,
                };
                (rank, idx)
            })
            .collect();
        eligible.sort();

        for (_, idx) in eligible {
            // An earlier fill this bar may have cancelled this order (OCO)
            if self.orders[idx].order.state != OrderState::Open {
                continue;
            }
            if let Some(price) = self.check_fill(&self.orders[idx].order, candle) {
                self.fill(idx, price);
            }
        }
        self.prune();
    }

    fn prune(&mut self) {
        self.orders.retain(|w| w.order.is_active());
    }

    /// Close whatever is open at `price` and cancel all working orders
    pub fn close_all(&mut self, price: f64, reason: ExitReason) {
        let active: Vec<OrderId> = self.active_orders().map(|o| o.id).collect();
        for id in active {
            self.cancel(id);
        }
        if let Some(pos) = self.position.as_ref() {
            let side = match pos.side {
                PositionSide::Short => Side::Buy,
                _ => Side::Sell,
            };
            let size = pos.size;
            self.apply_fill(side, size, price, reason);
        }
    }

    fn check_fill(&self, order: &Order, candle: &Candle) -> Option<f64> {
        match (order.side, order.order_type) {
            (Side::Buy, OrderType::Market) => Some(candle.open * (1.0 + self.slippage)),
            (Side::Sell, OrderType::Market) => Some(candle.open * (1.0 - self.slippage)),

            // Buy limit: fills if price trades at or below the limit
            (Side::Buy, OrderType::Limit) => {
                let limit = order.price?;
                if candle.open <= limit {
                    Some(candle.open)
                } else {
                    (candle.low <= limit).then_some(limit)
                }
            }

            // Sell limit: fills if price trades at or above the limit
            (Side::Sell, OrderType::Limit) => {
                let limit = order.price?;
                if candle.open >= limit {
                    Some(candle.open)
                } else {
                    (candle.high >= limit).then_some(limit)
                }
            }

            // Buy stop: triggers if price trades at or above the stop
            (Side::Buy, OrderType::Stop) => {
                let stop = order.price?;
                if candle.open >= stop {
                    Some(candle.open)
                } else {
                    (candle.high >= stop).then_some(stop)
                }
            }

            // Sell stop: triggers if price trades at or below the stop
            (Side::Sell, OrderType::Stop) => {
                let stop = order.price?;
                if candle.open <= stop {
                    Some(candle.open)
                } else {
                    (candle.low <= stop).then_some(stop)
                }
            }
        }
    }

    fn fill(&mut self, idx: usize, price: f64) {
        let (id, side, quantity, role) = {
            let w = &mut self.orders[idx];
            w.order.state = OrderState::Filled;
            w.order.filled_price = Some(price);
            w.order.updated_at = self.now;
            (w.order.id, w.order.side, w.order.quantity, w.order.role)
        };
        self.order_events.push(self.orders[idx].order.clone());

        debug!(
            symbol = %self.symbol,
            order_id = id,
            side = ?side,
            role = ?role,
            price,
            quantity,
            "Order filled"
        );

        let reason = match role {
            OrderRole::TakeProfit => ExitReason::TakeProfit,
            OrderRole::StopLoss => ExitReason::StopLoss,
            OrderRole::Entry | OrderRole::Exit => ExitReason::Signal,
        };
        self.apply_fill(side, quantity, price, reason);

        match role {
            OrderRole::Entry => self.activate_children(id),
            OrderRole::TakeProfit | OrderRole::StopLoss => self.cancel_siblings(idx),
            OrderRole::Exit => {}
        }
    }

    fn activate_children(&mut self, parent: OrderId) {
        let active_from = self.bar + 1;
        let now = self.now;
        for w in self.orders.iter_mut() {
            if w.order.parent_id == Some(parent) && w.order.state == OrderState::Pending {
                w.order.state = OrderState::Open;
                w.order.updated_at = now;
                w.active_from = active_from;
            }
        }
    }

    fn cancel_siblings(&mut self, idx: usize) {
        let (id, parent) = (self.orders[idx].order.id, self.orders[idx].order.parent_id);
        let siblings: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|w| w.order.parent_id == parent && w.order.id != id && w.order.is_active())
            .map(|w| w.order.id)
            .collect();
        for sibling in siblings {
            self.cancel_order(sibling);
        }
    }

    /// Update the position and realise P&L for a fill
    fn apply_fill(&mut self, side: Side, quantity: f64, price: f64, reason: ExitReason) {
        let commission = price * quantity * self.commission_rate;
        self.total_commission += commission;

        let fill_side = match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        };

        let Some(mut pos) = self.position.take() else {
            self.position = Some(OpenPosition {
                side: fill_side,
                size: quantity,
                entry_price: price,
                entry_time: self.now,
                entry_commission: commission,
            });
            return;
        };

        if pos.side == fill_side {
            let total = pos.size + quantity;
            pos.entry_price = (pos.entry_price * pos.size + price * quantity) / total;
            pos.size = total;
            pos.entry_commission += commission;
            self.position = Some(pos);
            return;
        }

        let closed = quantity.min(pos.size);
        let share = closed / pos.size;
        let entry_commission = pos.entry_commission * share;
        let exit_commission = commission * closed / quantity;
        let pnl = match pos.side {
            PositionSide::Short => (pos.entry_price - price) * closed,
            _ => (price - pos.entry_price) * closed,
        };
        let trade = Trade {
            symbol: self.symbol.clone(),
            side: if pos.side == PositionSide::Short {
                Side::Sell
            } else {
                Side::Buy
            },
            entry_price: pos.entry_price,
            exit_price: price,
            quantity: closed,
            entry_time: pos.entry_time,
            exit_time: self.now,
            pnl,
            commission: entry_commission + exit_commission,
            net_pnl: pnl - entry_commission - exit_commission,
            exit_reason: reason,
        };
        self.realized_pnl += trade.net_pnl;

        info!(
            symbol = %self.symbol,
            side = %pos.side,
            entry = pos.entry_price,
            exit = price,
            pnl = trade.net_pnl,
            reason = %reason,
            "Position closed"
        );
        self.closed_trades.push(trade);

        pos.size -= closed;
        pos.entry_commission -= entry_commission;
        let remainder = quantity - closed;

        if pos.size > 1e-12 {
            self.position = Some(pos);
        } else if remainder > 1e-12 {
            self.position = Some(OpenPosition {
                side: fill_side,
                size: remainder,
                entry_price: price,
                entry_time: self.now,
                entry_commission: commission - exit_commission,
            });
        }
    }

    fn submit(
        &mut self,
        side: Side,
        order_type: OrderType,
        role: OrderRole,
        price: Option<f64>,
        quantity: f64,
        parent_id: Option<OrderId>,
    ) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        let order = Order::new(
            id,
            self.symbol.clone(),
            side,
            order_type,
            role,
            price,
            quantity,
            parent_id,
            self.now,
        );
        self.orders.push(WorkingOrder {
            order,
            active_from: self.bar + 1,
        });
        id
    }

    fn submit_bracket(
        &mut self,
        side: Side,
        request: BracketRequest,
    ) -> Result<BracketHandle, GatewayError> {
        if request.symbol != self.symbol {
            return Err(GatewayError::SymbolMismatch {
                expected: self.symbol.to_string(),
                got: request.symbol.to_string(),
            });
        }
        if !(request.quantity > 0.0 && request.quantity.is_finite()) {
            return Err(GatewayError::InvalidQuantity(request.quantity));
        }
        let prices = [
            ("entry", request.entry_price.unwrap_or(1.0)),
            ("take-profit", request.take_profit_price),
            ("stop-loss", request.stop_loss_price),
        ];
        for (name, value) in prices {
            if !(value > 0.0 && value.is_finite()) {
                return Err(GatewayError::InvalidPrice { name, value });
            }
        }

        let parent = match request.entry_price {
            Some(limit) => self.submit(
                side,
                OrderType::Limit,
                OrderRole::Entry,
                Some(limit),
                request.quantity,
                None,
            ),
            None => self.submit(
                side,
                OrderType::Market,
                OrderRole::Entry,
                None,
                request.quantity,
                None,
            ),
        };
        let exit = side.opposite();
        let take_profit = self.submit(
            exit,
            OrderType::Limit,
            OrderRole::TakeProfit,
            Some(request.take_profit_price),
            request.quantity,
            Some(parent),
        );
        let stop_loss = self.submit(
            exit,
            OrderType::Stop,
            OrderRole::StopLoss,
            Some(request.stop_loss_price),
            request.quantity,
            Some(parent),
        );

        Ok(BracketHandle {
            parent,
            take_profit,
            stop_loss,
        })
    }
}

impl OrderGateway for SimulatedBroker {
    fn open_long(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError> {
        self.submit_bracket(Side::Buy, request)
    }

    fn open_short(&mut self, request: BracketRequest) -> Result<BracketHandle, GatewayError> {
        self.submit_bracket(Side::Sell, request)
    }

    fn close_position(&mut self, size: f64) -> Result<OrderId, GatewayError> {
        let side = match self.position.as_ref().map(|p| p.side) {
            Some(PositionSide::Long) => Side::Sell,
            Some(PositionSide::Short) => Side::Buy,
            _ => return Err(GatewayError::NoPosition),
        };
        if !(size > 0.0 && size.is_finite()) {
            return Err(GatewayError::InvalidQuantity(size));
        }
        Ok(self.submit(side, OrderType::Market, OrderRole::Exit, None, size, None))
    }

    fn cancel(&mut self, id: OrderId) -> CancelOutcome {
        let outcome = self.cancel_order(id);
        self.prune();
        outcome
    }

    fn position(&self) -> PositionSnapshot {
        match self.position.as_ref() {
            Some(p) => PositionSnapshot {
                side: p.side,
                size: p.size,
            },
            None => PositionSnapshot::flat(),
        }
    }
}

impl SimulatedBroker {
    /// Cancel `id` and, for a parent, its children. Leaves terminal orders in
    /// place so indices taken during bar processing stay valid.
    fn cancel_order(&mut self, id: OrderId) -> CancelOutcome {
        let Some(w) = self.orders.iter_mut().find(|w| w.order.id == id) else {
            return CancelOutcome::AlreadyGone;
        };
        if !w.order.is_active() {
            return CancelOutcome::AlreadyGone;
        }
        w.order.state = OrderState::Cancelled;
        w.order.updated_at = self.now;
        let is_parent = w.order.role == OrderRole::Entry;
        self.order_events.push(w.order.clone());

        if is_parent {
            let children: Vec<OrderId> = self
                .orders
                .iter()
                .filter(|c| c.order.parent_id == Some(id) && c.order.is_active())
                .map(|c| c.order.id)
                .collect();
            for child in children {
                self.cancel_order(child);
            }
        }
        CancelOutcome::Cancelled
    }
}
