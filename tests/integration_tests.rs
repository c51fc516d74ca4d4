//! Integration tests for the divergence trader
//!
//! These tests drive the public pipeline end to end: swing detection, pivot
//! tracking, classification, order sequencing and the backtest loop.

use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;

use divergence_trader::backtest::{run_symbols, Backtester};
use divergence_trader::divergence::{DivergenceClassifier, DivergenceState, SlopeReadings};
use divergence_trader::oms::{OrderIntent, PositionSnapshot, RecordingGateway};
use divergence_trader::pivots::{ConfirmedPivot, PivotSide, PivotTracker};
use divergence_trader::strategies::divergence::{
    DivergenceConfig, DivergenceEngine, DivergenceStrategy, OrderParams, SignalSequencer,
    Transition,
};
use divergence_trader::strategies::{create_strategy, Strategy};
use divergence_trader::swing::{detect_batch, SeriesPoint, SwingDetector, SWING_TOLERANCE};
use divergence_trader::{Candle, Config, ExitReason, PositionSide, Symbol};

// =============================================================================
// Test Utilities
// =============================================================================

/// Deterministic pseudo-random series (LCG), values in [0, 100)
fn noisy_series(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as f64 % 100.0
        })
        .collect()
}

/// Oscillating candles around `base` so both indicators swing
fn wave_candles(count: usize, base: f64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = base + 8.0 * (t / 9.0).sin() + 3.0 * (t / 3.7).cos() + 0.02 * t;
            let open = close - 0.4 * (t / 2.0).sin();
            let high = open.max(close) + 0.8;
            let low = open.min(close) - 0.8;
            Candle::new(start + Duration::days(i as i64), open, high, low, close, 1000.0)
                .unwrap()
        })
        .collect()
}

/// Daily candles opening at the previous close
fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let mut open = closes[0];
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let high = open.max(close) + 0.5;
            let low = open.min(close) - 0.5;
            let candle =
                Candle::new(start + Duration::days(i as i64), open, high, low, close, 1000.0)
                    .unwrap();
            open = close;
            candle
        })
        .collect()
}

/// 40 bars of chop, a fast 30-point drop, a bounce, a slower drop to a lower
/// low, then a recovery. The EMA makes a lower low while TSI makes a higher
/// low (confirmed on bar 79).
fn exhausted_selloff_candles() -> Vec<Candle> {
    let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 / 2.0).sin()).collect();
    for (bars, step) in [(10, -3.0), (10, 1.5), (15, -0.8), (15, 1.5)] {
        for _ in 0..bars {
            let last = closes[closes.len() - 1];
            closes.push(last + step);
        }
    }
    candles_from_closes(&closes)
}

fn pivot(bar: u64, value: f64, side: PivotSide) -> ConfirmedPivot {
    ConfirmedPivot { bar, value, side }
}

/// Trend series falling to 91 at bar 20, rising to 103 at bar 32, falling to
/// 83.5 at bar 45, then rising again
fn trend_with_lower_lows(bar: u64) -> f64 {
    let b = bar as f64;
    match bar {
        0..=20 => 110.0 - (b - 1.0),
        21..=32 => 91.0 + (b - 20.0),
        33..=45 => 103.0 - 1.5 * (b - 32.0),
        _ => 83.5 + (b - 45.0),
    }
}

/// Oscillator with lows at the same bars, -20 then -10
fn oscillator_with_higher_lows(bar: u64) -> f64 {
    let b = bar as f64;
    match bar {
        0..=32 => (b - 20.0).abs() - 20.0,
        33..=45 => -8.0 - (b - 32.0) * 2.0 / 13.0,
        _ => -10.0 + (b - 45.0),
    }
}

// =============================================================================
// Swing detection
// =============================================================================

#[test]
fn test_online_matches_batch_on_every_prefix() {
    let series = noisy_series(120, 7);
    for k in 1..=4 {
        let mut detector = SwingDetector::new(k);
        for (i, &value) in series.iter().enumerate() {
            let online = detector.update(i as u64 + 1, value);
            let batch = detect_batch(k, &series[..=i]);
            assert_eq!(
                batch.last().copied(),
                Some(online),
                "k={} diverged at bar {}",
                k,
                i + 1
            );
        }
    }
}

#[test]
fn test_confirmation_lags_by_lookback() {
    let series = noisy_series(60, 11);
    for k in 1..=3 {
        for (i, signal) in detect_batch(k, &series).iter().enumerate() {
            if let Some(center) = signal.center {
                assert_eq!(center.bar + k as u64, i as u64 + 1);
            }
        }
    }
}

#[test]
fn test_flags_match_window_extremes_at_confirmation_bar() {
    let series = noisy_series(150, 23);
    for k in 1..=3usize {
        let mut detector = SwingDetector::new(k);
        for (i, &value) in series.iter().enumerate() {
            let signal = detector.update(i as u64 + 1, value);
            if i < 2 * k {
                assert!(signal.is_empty() && signal.center.is_none());
                continue;
            }
            // Emitted on bar i+1 about the sample k bars back
            let c = i - k;
            let window = &series[c - k..=c + k];
            let highest = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().copied().fold(f64::INFINITY, f64::min);
            let is_high = series[c] >= highest - SWING_TOLERANCE;
            let is_low = series[c] <= lowest + SWING_TOLERANCE;

            assert_eq!(signal.is_swing_high, is_high, "k={} bar={}", k, i + 1);
            assert_eq!(signal.is_swing_low, is_low, "k={} bar={}", k, i + 1);
            let expected_center = (is_high || is_low).then_some(SeriesPoint {
                bar: c as u64 + 1,
                value: series[c],
            });
            assert_eq!(signal.center, expected_center);
        }
    }
}

#[test]
fn test_later_samples_never_change_earlier_signals() {
    let series = noisy_series(80, 5);
    let baseline = detect_batch(2, &series);
    let mut altered = series.clone();
    for v in altered.iter_mut().skip(40) {
        *v = 1000.0 - *v;
    }
    assert_eq!(detect_batch(2, &altered)[..40], baseline[..40]);
}

// =============================================================================
// Pivot tracking
// =============================================================================

#[test]
fn test_pivot_pair_keeps_two_most_recent() {
    let mut tracker = PivotTracker::new();
    for (bar, value) in [(3, 1.0), (8, 2.0), (15, 3.0), (21, 4.0), (30, 5.0)] {
        tracker.push(pivot(bar, value, PivotSide::Low));
    }
    let bars: Vec<u64> = tracker.pair(PivotSide::Low).iter().map(|p| p.bar).collect();
    assert_eq!(bars, vec![21, 30]);
    assert!(tracker.pair(PivotSide::High).is_empty());
}

#[test]
fn test_slope_absent_with_fewer_than_two_pivots() {
    let mut tracker = PivotTracker::new();
    assert!(tracker.slope(PivotSide::High, 5, u64::MAX).is_none());
    tracker.push(pivot(4, 10.0, PivotSide::High));
    for max_age in [0, 1, 100, u64::MAX] {
        assert!(tracker.slope(PivotSide::High, 5, max_age).is_none());
    }
}

#[test]
fn test_stale_pair_is_ignored() {
    let mut tracker = PivotTracker::new();
    tracker.push(pivot(10, 4.0, PivotSide::Low));
    tracker.push(pivot(40, 10.0, PivotSide::Low));

    assert!(tracker.slope(PivotSide::Low, 100, 30).is_none());

    let slope = tracker.slope(PivotSide::Low, 100, 61).unwrap();
    assert_eq!(slope.dx, 30);
    assert_relative_eq!(slope.value, (10.0 - 4.0) / 30.0, epsilon = 1e-12);
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_classifier_threshold() {
    let noise = SlopeReadings {
        low_osc: Some(1e-7),
        low_trend: Some(-1e-7),
        high_osc: Some(-1e-7),
        high_trend: Some(1e-7),
    };
    assert_eq!(
        DivergenceClassifier::new(1e-6, true).classify(&noise),
        DivergenceState::default()
    );

    let real = SlopeReadings {
        low_osc: Some(1e-3),
        low_trend: Some(-1e-3),
        ..Default::default()
    };
    let state = DivergenceClassifier::new(1e-6, true).classify(&real);
    assert!(state.bullish);
    assert!(!state.bearish);
}

#[test]
fn test_either_series_mode_accepts_single_leg() {
    let trend_only = SlopeReadings {
        low_trend: Some(-1e-3),
        ..Default::default()
    };
    assert!(DivergenceClassifier::new(1e-6, false).classify(&trend_only).bullish);
    assert!(!DivergenceClassifier::new(1e-6, true).classify(&trend_only).bullish);
}

// =============================================================================
// Engine + sequencer
// =============================================================================

#[test]
fn test_lower_trend_lows_with_higher_oscillator_lows_open_one_long() {
    let config = DivergenceConfig::default();
    assert!(config.use_paired_at_price);
    let mut engine = DivergenceEngine::new(&config);
    let mut sequencer = SignalSequencer::new(Symbol::new("NQ"), OrderParams::from(&config));
    let mut gateway = RecordingGateway::new();
    let close = 100.0;

    let mut opened_at = Vec::new();
    for bar in 1..=60 {
        let reading = engine
            .step(
                bar,
                Some(oscillator_with_higher_lows(bar)),
                Some(trend_with_lower_lows(bar)),
            )
            .unwrap();
        let transition = sequencer
            .step(bar, close, reading.state, &mut gateway)
            .unwrap();
        if transition == Transition::OpenLong {
            opened_at.push(bar);
        }
    }

    // Pivot at bar 45 is confirmed one bar later
    assert_eq!(opened_at, vec![46]);
    assert_eq!(gateway.intents().len(), 1);
    match &gateway.intents()[0] {
        OrderIntent::OpenLong(request) => {
            assert_relative_eq!(request.entry_price.unwrap(), close * 1.001, epsilon = 1e-9);
            assert_relative_eq!(request.take_profit_price, close * 1.10, epsilon = 1e-9);
            assert_relative_eq!(request.stop_loss_price, close * 0.95, epsilon = 1e-9);
            assert_relative_eq!(request.quantity, 1.0);
        }
        other => panic!("expected OpenLong, got {:?}", other),
    }
}

#[test]
fn test_direct_mode_sees_same_divergence() {
    let config = DivergenceConfig {
        use_paired_at_price: false,
        ..Default::default()
    };
    let mut engine = DivergenceEngine::new(&config);
    let first_bullish = (1..=60)
        .find(|&bar| {
            engine
                .step(
                    bar,
                    Some(oscillator_with_higher_lows(bar)),
                    Some(trend_with_lower_lows(bar)),
                )
                .unwrap()
                .state
                .bullish
        });
    assert_eq!(first_bullish, Some(46));
}

#[test]
fn test_selloff_divergence_opens_one_long_through_indicators() {
    let candles = exhausted_selloff_candles();
    let mut strategy =
        DivergenceStrategy::new(Symbol::new("NQ"), DivergenceConfig::default()).unwrap();
    let mut gateway = RecordingGateway::new();

    let mut opened_at = Vec::new();
    for (i, candle) in candles.iter().enumerate() {
        strategy.on_bar(candle, &mut gateway).unwrap();
        let reading = strategy.last_reading().unwrap();
        assert!(!reading.state.bearish, "bearish on bar {}", reading.bar);
        if i + 1 == 79 {
            assert!(reading.slopes.low_osc.unwrap() > 0.0);
            assert!(reading.slopes.low_trend.unwrap() < 0.0);
        }
        if strategy.last_transition() == Transition::OpenLong {
            opened_at.push(i + 1);
        }
    }

    // Later bullish bars are held back by the pending entry
    assert_eq!(opened_at, vec![79]);
    assert_eq!(gateway.intents().len(), 1);
    let close = candles[78].close;
    match &gateway.intents()[0] {
        OrderIntent::OpenLong(request) => {
            assert_relative_eq!(request.entry_price.unwrap(), close * 1.001, epsilon = 1e-9);
            assert_relative_eq!(request.take_profit_price, close * 1.10, epsilon = 1e-9);
            assert_relative_eq!(request.stop_loss_price, close * 0.95, epsilon = 1e-9);
            assert_relative_eq!(request.quantity, 1.0);
        }
        other => panic!("expected OpenLong, got {:?}", other),
    }
}

#[test]
fn test_selloff_backtest_fills_bracket_from_signal_close() {
    let candles = exhausted_selloff_candles();
    let config = Config::default();
    let symbol = Symbol::new("NQ");
    let strategy = create_strategy(&config, &symbol).unwrap();
    let result = Backtester::new(&config, symbol, strategy)
        .run(&candles)
        .unwrap();

    assert_eq!(result.trades.len(), 2);
    let signal_close = candles[78].close;
    let first = &result.trades[0];
    // Bar 80 opens at the bar-79 close, under the limit
    assert_relative_eq!(first.entry_price, signal_close, epsilon = 1e-9);
    assert_eq!(first.entry_time, candles[79].datetime);
    assert_eq!(first.exit_reason, ExitReason::TakeProfit);
    assert_relative_eq!(first.exit_price, signal_close * 1.10, epsilon = 1e-9);
    assert_eq!(first.exit_time, candles[83].datetime);

    // Still bullish after the take-profit, so the next bar re-enters
    let second = &result.trades[1];
    let reentry_close = candles[83].close;
    assert_relative_eq!(second.entry_price, reentry_close, epsilon = 1e-9);
    assert_eq!(second.entry_time, candles[84].datetime);
    assert_eq!(second.exit_reason, ExitReason::TakeProfit);
    assert_relative_eq!(second.exit_price, reentry_close * 1.10, epsilon = 1e-9);
    assert_eq!(second.exit_time, candles[89].datetime);
}

#[test]
fn test_bearish_divergence_closes_long_cleanly() {
    let config = DivergenceConfig::default();
    let mut sequencer = SignalSequencer::new(Symbol::new("NQ"), OrderParams::from(&config));
    let mut gateway = RecordingGateway::new();

    let bullish = DivergenceState {
        bullish: true,
        bearish: false,
    };
    let bearish = DivergenceState {
        bullish: false,
        bearish: true,
    };

    assert_eq!(
        sequencer.step(10, 100.0, bullish, &mut gateway).unwrap(),
        Transition::OpenLong
    );
    let (tp, sl) = sequencer.children();
    let (tp, sl) = (tp.unwrap(), sl.unwrap());

    gateway.set_position(PositionSnapshot::long(1.0));
    gateway.take_intents();

    assert_eq!(
        sequencer.step(11, 104.0, bearish, &mut gateway).unwrap(),
        Transition::CloseLong
    );
    assert_eq!(
        gateway.intents(),
        &[
            OrderIntent::Cancel(tp),
            OrderIntent::Cancel(sl),
            OrderIntent::ClosePosition { size: 1.0 },
        ]
    );
    assert_eq!(sequencer.state(), PositionSide::Flat);
    assert_eq!(sequencer.children(), (None, None));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_invalid_strategy_config_rejected() {
    for bad in [
        serde_json::json!({ "lookback": 0 }),
        serde_json::json!({ "take_profit_pct": -0.1 }),
        serde_json::json!({ "stop_loss_pct": 0.0 }),
        serde_json::json!({ "ema_period": 0 }),
    ] {
        assert!(DivergenceConfig::from_value(&bad).is_err(), "{bad} accepted");
    }

    let mut config = Config::default();
    config.set_strategy_param("lookback", serde_json::json!(0));
    assert!(create_strategy(&config, &Symbol::new("NQ")).is_err());
}

// =============================================================================
// Backtesting
// =============================================================================

#[test]
fn test_backtest_runs_full_series() {
    let config = Config::default();
    let symbol = Symbol::new("NQ");
    let candles = wave_candles(400, 100.0);
    let strategy = create_strategy(&config, &symbol).unwrap();

    let result = Backtester::new(&config, symbol, strategy)
        .run(&candles)
        .unwrap();

    assert_eq!(result.bars, 400);
    assert_eq!(result.equity_curve.len(), 400);
    assert!(result.metrics.end_value.is_finite());
    assert_eq!(result.metrics.total_trades, result.trades.len());
    for trade in &result.trades {
        assert!(trade.exit_time >= trade.entry_time);
        assert_relative_eq!(trade.net_pnl, trade.pnl - trade.commission, epsilon = 1e-9);
    }
}

#[test]
fn test_run_symbols_sorted_and_independent() {
    let config = Config::default();
    let mut data = HashMap::new();
    data.insert(Symbol::new("NQ"), wave_candles(200, 100.0));
    data.insert(Symbol::new("ES"), wave_candles(200, 100.0));

    let results = run_symbols(&config, data).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].symbol, Symbol::new("ES"));
    assert_eq!(results[1].symbol, Symbol::new("NQ"));
    // Same bars, separate state: identical outcomes
    assert_relative_eq!(
        results[0].metrics.end_value,
        results[1].metrics.end_value,
        epsilon = 1e-9
    );
}
