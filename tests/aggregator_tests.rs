// Aggregation engine and indicator tests

mod helpers;

use chrono::Duration;
use helpers::*;
use std::sync::Arc;
use trading_agent::aggregator::{BarAggregator, WINDOW_CAP};
use trading_agent::brokerage::BrokerageFacade;
use trading_agent::context::AppContext;
use trading_agent::gateway::BroadcastSink;
use trading_agent::indicators::{moving_average, relative_strength_index};
use trading_agent::marketdata::MarketDataClient;
use trading_agent::types::{AggregatedState, Bar};

fn test_ctx() -> Arc<AppContext> {
    let cfg = test_cfg();
    Arc::new(AppContext {
        aggregator: Arc::new(BarAggregator::new(cfg.interval)),
        brokerage: Arc::new(BrokerageFacade::new(&cfg)),
        marketdata: Arc::new(MarketDataClient::new(&cfg)),
        chat: Arc::new(ScriptedChat::new(Vec::new())),
        sink: BroadcastSink::new(),
        cfg,
    })
}

fn closes(values: &[f64]) -> Vec<Bar> {
    values.iter().copied().map(bar).collect()
}

// ============================================================================
// Indicator math
// ============================================================================

#[test]
fn moving_average_with_enough_bars_truncates_to_373() {
    let bars = closes(&[300.0, 350.0, 350.0, 400.0, 370.0]);
    assert_eq!(moving_average(&bars, 3) as i64, 373);
}

#[test]
fn moving_average_with_fewer_bars_returns_last_close() {
    let bars = closes(&[300.0, 350.0]);
    assert_eq!(moving_average(&bars, 5), 350.0);
}

#[test]
fn moving_average_of_empty_input_is_zero() {
    assert_eq!(moving_average(&[], 5), 0.0);
}

#[test]
fn rsi_truncates_to_62() {
    let bars = closes(&[300.0, 350.0, 350.0, 400.0, 370.0]);
    assert_eq!(relative_strength_index(&bars, 4) as i64, 62);
}

#[test]
fn rsi_of_single_bar_is_neutral_50() {
    let bars = closes(&[300.0]);
    assert_eq!(relative_strength_index(&bars, 6), 50.0);
}

#[test]
fn rsi_without_losses_is_100() {
    let bars = closes(&[300.0, 310.0, 310.0, 320.0]);
    assert_eq!(relative_strength_index(&bars, 4), 100.0);
}

// ============================================================================
// Window admission and capacity
// ============================================================================

#[tokio::test]
async fn windows_never_exceed_cap_and_stay_ordered() {
    let ctx = test_ctx();

    // Hourly spacing admits into the three intraday windows on every tick
    // while keeping the minute fixed, so the decision gate never fires.
    let base = ts(0, 3);
    for i in 0..100i64 {
        let tick = tick_at(base + Duration::hours(i), 300.0 + i as f64);
        ctx.aggregator.handle_tick(&ctx, tick).await;
    }

    let state = ctx.aggregator.current_data().await;
    for window in [&state.one, &state.fifteen, &state.hour, &state.day] {
        assert!(window.len() <= WINDOW_CAP);
        for pair in window.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
    assert_eq!(state.one.len(), WINDOW_CAP);
    assert_eq!(state.hour.len(), WINDOW_CAP);
    // 100 hourly ticks cover four full days plus the seed bar.
    assert_eq!(state.day.len(), 5);
}

#[tokio::test]
async fn tick_below_threshold_is_not_admitted() {
    let ctx = test_ctx();

    let first = tick_at(ts(10, 1), 300.0);
    let second = tick_at(ts(10, 2), 301.0);
    ctx.aggregator.handle_tick(&ctx, first).await;
    ctx.aggregator.handle_tick(&ctx, second).await;

    let state = ctx.aggregator.current_data().await;
    assert_eq!(state.one.len(), 2);
    assert_eq!(state.fifteen.len(), 1, "no false admission into 15m window");
    assert_eq!(state.hour.len(), 1);
    assert_eq!(state.day.len(), 1);
}

#[tokio::test]
async fn admitted_bar_carries_indicators_from_its_own_window() {
    let ctx = test_ctx();

    let base = ts(0, 3);
    for (i, close) in [300.0, 350.0, 350.0, 400.0, 370.0].iter().enumerate() {
        let tick = tick_at(base + Duration::hours(i as i64), *close);
        ctx.aggregator.handle_tick(&ctx, tick).await;
    }

    let state = ctx.aggregator.current_data().await;
    let last = state.one.last().unwrap();
    // Trailing bars plus the new one: the same series the indicator tests use.
    assert_eq!(moving_average(&state.one, 5), last.five_period_ma);
    assert!(last.six_period_rsi > 0.0);
    // The first admitted bar was stamped from itself alone.
    assert_eq!(state.one[0].five_period_ma, 300.0);
    assert_eq!(state.one[0].six_period_rsi, 50.0);
}

#[tokio::test]
async fn seed_truncates_to_cap() {
    let ctx = test_ctx();
    let many: Vec<Bar> = (0..70).map(|i| bar(300.0 + i as f64)).collect();
    ctx.aggregator
        .seed(many.clone(), many.clone(), many.clone(), many)
        .await;

    let state = ctx.aggregator.current_data().await;
    assert_eq!(state.one.len(), WINDOW_CAP);
    // Oldest entries evicted first.
    assert_eq!(state.one[0].close, 310.0);
}

// ============================================================================
// Broadcast path
// ============================================================================

#[tokio::test]
async fn every_tick_is_broadcast_even_without_admission() {
    let ctx = test_ctx();
    let (_id, mut rx) = ctx.sink.register().await;

    // Three ticks one minute apart: only the 1m window admits after the first.
    for minute in [1, 2, 3] {
        let tick = tick_at(ts(10, minute), 300.0);
        ctx.aggregator.handle_tick(&ctx, tick).await;
    }

    let mut received = 0;
    while let Ok(payload) = rx.try_recv() {
        let state: AggregatedState = serde_json::from_str(&payload).unwrap();
        assert_eq!(state.fifteen.len(), 1);
        received += 1;
    }
    assert_eq!(received, 3);
}

#[tokio::test]
async fn one_dead_observer_does_not_block_the_others() {
    let sink = BroadcastSink::new();
    let (_id_a, mut rx_a) = sink.register().await;
    let (_id_b, rx_b) = sink.register().await;
    drop(rx_b);

    sink.broadcast(&serde_json::json!({"ping": true}))
        .await
        .unwrap();

    assert!(rx_a.try_recv().is_ok(), "healthy observer still gets the message");
    assert_eq!(sink.observer_count().await, 1, "dead observer dropped");
}

// ============================================================================
// Serialization regression
// ============================================================================

#[tokio::test]
async fn string_fields_with_boolean_literals_survive_round_trip() {
    use trading_agent::types::OpenPosition;

    // The historical string-replacement serializer corrupted payloads like
    // this one; the structured serializer must not.
    let position = OpenPosition {
        symbol: "True'False\"TSLA".to_string(),
        quantity: 1.0,
        market_value: 100.0,
        original_cost: 90.0,
        unrealized_profit_loss: 10.0,
    };
    let encoded = serde_json::to_string(&position).unwrap();
    let decoded: OpenPosition = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.symbol, "True'False\"TSLA");
}
