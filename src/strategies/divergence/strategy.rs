//! Divergence Strategy Implementation
//!
//! Computes the TSI oscillator and the trend EMA from closes, feeds both to
//! the divergence engine and lets the sequencer act on the result.

use anyhow::Result;

use crate::indicators::{StreamingEma, TrueStrengthIndex};
use crate::oms::{Order, OrderGateway};
use crate::strategies::Strategy;
use crate::{Candle, Symbol, Trade};

use super::config::DivergenceConfig;
use super::engine::{DivergenceEngine, DivergenceReading};
use super::sequencer::{OrderParams, SignalSequencer, Transition};

pub struct DivergenceStrategy {
    config: DivergenceConfig,
    tsi: TrueStrengthIndex,
    ema: StreamingEma,
    engine: DivergenceEngine,
    sequencer: SignalSequencer,
    bar: u64,
    last_reading: Option<DivergenceReading>,
    last_transition: Transition,
}

impl DivergenceStrategy {
    pub fn new(symbol: Symbol, config: DivergenceConfig) -> Result<Self> {
        Ok(Self {
            tsi: TrueStrengthIndex::new(config.tsi_fast, config.tsi_slow)?,
            ema: StreamingEma::new(config.ema_period)?,
            engine: DivergenceEngine::new(&config),
            sequencer: SignalSequencer::new(symbol, OrderParams::from(&config)),
            bar: 0,
            last_reading: None,
            last_transition: Transition::Hold,
            config,
        })
    }

    pub fn config(&self) -> &DivergenceConfig {
        &self.config
    }

    pub fn last_reading(&self) -> Option<&DivergenceReading> {
        self.last_reading.as_ref()
    }

    pub fn last_transition(&self) -> Transition {
        self.last_transition
    }
}

impl Strategy for DivergenceStrategy {
    fn name(&self) -> &'static str {
        "divergence"
    }

    fn on_bar(&mut self, candle: &Candle, gateway: &mut dyn OrderGateway) -> Result<()> {
        self.bar += 1;
        let oscillator = self.tsi.next(candle.close);
        let trend = self.ema.next(candle.close);

        let reading = self.engine.step(self.bar, oscillator, trend)?;
        self.last_transition = self
            .sequencer
            .step(self.bar, candle.close, reading.state, gateway)?;
        self.last_reading = Some(reading);
        Ok(())
    }

    fn notify_order(&mut self, order: &Order) {
        self.sequencer.notify_order(order);
        if self.config.strategy_debug {
            tracing::debug!(
                order_id = order.id,
                role = ?order.role,
                state = ?order.state,
                price = ?order.filled_price,
                "Order update"
            );
        }
    }

    fn notify_trade(&mut self, trade: &Trade) {
        tracing::info!(
            symbol = %trade.symbol,
            pnl = trade.net_pnl,
            return_pct = format!("{:.2}%", trade.return_pct()),
            reason = %trade.exit_reason,
            "Trade closed"
        );
    }
}
