//! Strategy loop scenarios against a scripted exchange and the paper client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use common::{
    Candle, Config, EngineCommand, EngineState, Error, ExchangeClient, Fill, Order, OrderSide,
    Position, PositionSide, Result,
};
use engine::{Engine, EngineHandle, EngineSettings, OrderExecutor};
use paper::PaperClient;
use risk::{EntryDecision, EntryRejection, ExitReason, PositionManager, RiskConfig};
use strategy::{IndicatorSettings, SignalAnalyzer};

const SYMBOL: &str = "BTCUSDT";

#[derive(Default)]
struct MockState {
    price: Option<f64>,
    candles: Vec<Candle>,
    reject_orders: bool,
    orders: Vec<Order>,
    cancel_calls: usize,
}

/// Exchange whose market data and order outcomes are set by the test.
#[derive(Default)]
struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    fn with_price(price: f64) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().price = Some(price);
        mock
    }

    fn set_candles(&self, candles: Vec<Candle>) {
        self.state.lock().unwrap().candles = candles;
    }

    fn reject_orders(&self, reject: bool) {
        self.state.lock().unwrap().reject_orders = reject;
    }

    fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    fn cancel_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_calls
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn candles(&self, _symbol: &str, _interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let state = self.state.lock().unwrap();
        let start = state.candles.len().saturating_sub(limit);
        Ok(state.candles[start..].to_vec())
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        self.state
            .lock()
            .unwrap()
            .price
            .ok_or_else(|| Error::Exchange(format!("no ticker for {symbol}")))
    }

    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let mut state = self.state.lock().unwrap();
        if state.reject_orders {
            return Err(Error::Exchange("order rejected".into()));
        }
        state.orders.push(order.clone());
        Ok(Fill {
            order_id: format!("mock-{}", state.orders.len()),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price: None,
            quantity: order.quantity,
            timestamp: Utc::now(),
        })
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<()> {
        self.state.lock().unwrap().cancel_calls += 1;
        Ok(())
    }

    async fn wallet_balance(&self, _coin: &str) -> Result<f64> {
        Ok(1_000.0)
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn settings() -> EngineSettings {
    EngineSettings {
        symbol: SYMBOL.into(),
        quantity: 0.01,
        candle_interval: "1".into(),
        candle_window: 100,
        cycle_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
    }
}

fn build_engine(client: Arc<dyn ExchangeClient>) -> (Engine, EngineHandle) {
    let cfg = Config::from_lookup(|_| None).unwrap();
    let analyzer = SignalAnalyzer::from_config(&cfg, &IndicatorSettings::default());
    Engine::new(
        settings(),
        Box::new(analyzer),
        PositionManager::new(RiskConfig::default()),
        OrderExecutor::new(client, SYMBOL),
    )
}

/// Early sell-off, long flat stretch, then a heavy-volume drop through the
/// lower band: scores as a strong BUY closing at 90.
fn buy_setup_candles() -> Vec<Candle> {
    let mut closes: Vec<f64> = (0..20).map(|i| 120.0 - i as f64).collect();
    closes.extend(std::iter::repeat(101.0).take(39));
    closes.push(90.0);

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume: if i == closes.len() - 1 { 500.0 } else { 100.0 },
            start_time: t0() + chrono::Duration::minutes(i as i64),
        })
        .collect()
}

fn long_at(entry_price: f64) -> Position {
    Position {
        symbol: SYMBOL.into(),
        side: PositionSide::Long,
        size: 0.01,
        entry_price,
        opened_at: t0(),
        order_id: "existing".into(),
    }
}

#[tokio::test]
async fn buy_signal_opens_exactly_one_position() {
    let mock = Arc::new(MockExchange::with_price(90.0));
    mock.set_candles(buy_setup_candles());
    let (mut engine, _handle) = build_engine(mock.clone());

    let report = engine.run_cycle(t0()).await;

    assert!(!report.degraded);
    assert!(matches!(
        report.entry,
        Some(EntryDecision::Open { side: PositionSide::Long, .. })
    ));
    let id = report.opened.expect("position should be tracked");
    assert_eq!(engine.positions().len(), 1);

    let position = engine.positions().get(id).unwrap();
    assert_eq!(position.entry_price, 90.0, "falls back to the ticker when no fill price");
    assert_eq!(position.order_id, "mock-1");
    assert_eq!(position.opened_at, t0());

    let orders = mock.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert!(!orders[0].reduce_only);
}

#[tokio::test]
async fn second_signal_inside_cooldown_is_skipped() {
    let mock = Arc::new(MockExchange::with_price(90.0));
    mock.set_candles(buy_setup_candles());
    let (mut engine, _handle) = build_engine(mock.clone());

    engine.run_cycle(t0()).await;
    let report = engine.run_cycle(t0() + chrono::Duration::seconds(10)).await;

    assert_eq!(
        report.entry,
        Some(EntryDecision::Skip(EntryRejection::CooldownActive { remaining_secs: 50 }))
    );
    assert!(report.opened.is_none());
    assert_eq!(engine.positions().len(), 1);
    assert_eq!(mock.orders().len(), 1);
}

#[tokio::test]
async fn take_profit_closes_by_id() {
    let mock = Arc::new(MockExchange::with_price(100.2));
    let (mut engine, _handle) = build_engine(mock.clone());
    let id = engine.positions_mut().insert(long_at(100.0)).unwrap();

    let report = engine.run_cycle(t0()).await;

    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].0, id);
    assert!(matches!(report.closed[0].1, ExitReason::TakeProfit { .. }));
    assert!(engine.positions().is_empty());

    let orders = mock.orders();
    assert_eq!(orders[0].side, OrderSide::Sell);
    assert!(orders[0].reduce_only);
}

#[tokio::test]
async fn failed_close_keeps_position_tracked() {
    let mock = Arc::new(MockExchange::with_price(99.0));
    mock.reject_orders(true);
    let (mut engine, _handle) = build_engine(mock.clone());
    engine.positions_mut().insert(long_at(100.0));

    let report = engine.run_cycle(t0()).await;

    assert!(report.degraded);
    assert!(report.closed.is_empty());
    assert_eq!(engine.positions().len(), 1);

    // Retried on the next cycle once the exchange accepts orders again.
    mock.reject_orders(false);
    let report = engine.run_cycle(t0() + chrono::Duration::seconds(10)).await;
    assert!(matches!(report.closed[0].1, ExitReason::StopLoss { .. }));
    assert!(engine.positions().is_empty());
}

#[tokio::test]
async fn missing_price_stalls_the_cycle() {
    let mock = Arc::new(MockExchange::default());
    mock.set_candles(buy_setup_candles());
    let (mut engine, _handle) = build_engine(mock.clone());
    engine.positions_mut().insert(long_at(100.0));

    let report = engine.run_cycle(t0() + chrono::Duration::hours(1)).await;

    assert!(report.degraded);
    assert!(report.price.is_none());
    assert!(report.entry.is_none());
    assert!(report.closed.is_empty(), "timeout needs a price to act on");
    assert_eq!(engine.positions().len(), 1);
    assert!(mock.orders().is_empty());
}

#[tokio::test]
async fn zero_price_is_treated_as_missing() {
    let mock = Arc::new(MockExchange::with_price(0.0));
    mock.set_candles(buy_setup_candles());
    let (mut engine, _handle) = build_engine(mock.clone());
    engine.positions_mut().insert(long_at(100.0));
    engine.positions_mut().insert(Position {
        side: PositionSide::Short,
        ..long_at(100.0)
    });

    let report = engine.run_cycle(t0()).await;

    assert!(report.degraded);
    assert!(report.price.is_none());
    assert!(report.closed.is_empty());
    assert!(report.entry.is_none());
    assert_eq!(engine.positions().len(), 2);
    assert!(mock.orders().is_empty());
}

#[tokio::test]
async fn unusable_ticker_falls_back_to_cycle_price() {
    let mock = Arc::new(MockExchange::with_price(0.0));
    let executor = OrderExecutor::new(mock.clone(), SYMBOL);

    let position = executor.open(PositionSide::Long, 0.01, 95.0, t0()).await.unwrap();

    assert_eq!(position.entry_price, 95.0);
    assert_eq!(position.size, 0.01);
}

#[tokio::test]
async fn empty_candle_window_is_not_fatal() {
    let mock = Arc::new(MockExchange::with_price(100.0));
    let (mut engine, _handle) = build_engine(mock.clone());

    let report = engine.run_cycle(t0()).await;

    assert_eq!(report.entry, Some(EntryDecision::Skip(EntryRejection::NoMarketData)));
    assert!(engine.positions().is_empty());
    assert!(engine.positions().last_signal_at().is_none());
}

#[tokio::test]
async fn shutdown_closes_everything_and_cancels_orders() {
    let mock = Arc::new(MockExchange::with_price(100.0));
    let (mut engine, _handle) = build_engine(mock.clone());
    engine.positions_mut().insert(long_at(100.0));
    engine.positions_mut().insert(long_at(100.0));

    engine.shutdown().await;

    assert!(engine.positions().is_empty());
    assert_eq!(mock.orders().len(), 2);
    assert!(mock.orders().iter().all(|o| o.reduce_only && o.side == OrderSide::Sell));
    assert_eq!(mock.cancel_calls(), 1);
}

#[tokio::test]
async fn initialize_cancels_stale_orders() {
    let mock = Arc::new(MockExchange::with_price(100.0));
    let (engine, _handle) = build_engine(mock.clone());

    engine.initialize().await.unwrap();
    assert_eq!(mock.cancel_calls(), 1);
}

async fn paper_with_buy_setup() -> Arc<PaperClient> {
    let paper = Arc::new(PaperClient::new(10_000.0, 0.0));
    for candle in buy_setup_candles() {
        paper.push_candle(SYMBOL, candle).await;
    }
    paper
}

#[tokio::test]
async fn stop_command_runs_shutdown_sweep() {
    let paper = paper_with_buy_setup().await;
    let (engine, handle) = build_engine(paper.clone());

    let task = tokio::spawn(engine.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().await, EngineState::Running);

    handle.send(EngineCommand::Stop).await;
    task.await.unwrap();

    assert_eq!(handle.state().await, EngineState::Stopped);
    assert_eq!(handle.status().await.active_positions, 0);

    // Entry on the first cycle, exit during shutdown.
    let fills = paper.fills().await;
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0].side, OrderSide::Buy);
    assert_eq!(fills[1].side, OrderSide::Sell);
}

#[tokio::test]
async fn paused_engine_takes_no_entries() {
    let paper = paper_with_buy_setup().await;
    let (engine, handle) = build_engine(paper.clone());

    handle.send(EngineCommand::Pause).await;
    let task = tokio::spawn(engine.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().await, EngineState::Paused);

    handle.send(EngineCommand::Stop).await;
    task.await.unwrap();

    assert!(paper.fills().await.is_empty());
}
