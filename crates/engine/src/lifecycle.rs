use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use common::{is_tradable_price, Config, EngineCommand, EngineState, PositionId, Result, StrategyStatus};
use risk::{EntryDecision, ExitReason, PositionManager, StrategyState};
use strategy::Strategy;

use crate::executor::OrderExecutor;

/// Quote coin checked at start-up.
const SETTLEMENT_COIN: &str = "USDT";

/// Static settings of one strategy loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbol: String,
    pub quantity: f64,
    pub candle_interval: String,
    pub candle_window: usize,
    /// Delay between the end of one cycle and the start of the next.
    pub cycle_interval: Duration,
    /// Extra delay after a cycle in which the exchange failed.
    pub error_backoff: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            symbol: cfg.symbol.clone(),
            quantity: cfg.quantity,
            candle_interval: cfg.candle_interval.clone(),
            candle_window: cfg.candle_window,
            cycle_interval: Duration::from_secs(cfg.cycle_interval_secs),
            error_backoff: Duration::from_secs(cfg.error_backoff_secs),
        }
    }
}

/// What one cycle did. Returned for logging and tests.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub price: Option<f64>,
    pub closed: Vec<(PositionId, ExitReason)>,
    pub entry: Option<EntryDecision>,
    pub opened: Option<PositionId>,
    /// At least one exchange call failed during the cycle.
    pub degraded: bool,
}

/// Cloneable handle to a running strategy loop.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    status: Arc<RwLock<StrategyStatus>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Snapshot published after the most recent cycle.
    pub async fn status(&self) -> StrategyStatus {
        self.status.read().await.clone()
    }
}

/// The strategy loop for one symbol.
///
/// Sole owner of the symbol's `StrategyState`: cycles run one at a time and
/// commands are only handled between cycles, so positions are never mutated
/// concurrently.
pub struct Engine {
    settings: EngineSettings,
    strategy: Box<dyn Strategy>,
    manager: PositionManager,
    executor: OrderExecutor,
    positions: StrategyState,
    paused: bool,
    state: Arc<RwLock<EngineState>>,
    status: Arc<RwLock<StrategyStatus>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        strategy: Box<dyn Strategy>,
        manager: PositionManager,
        executor: OrderExecutor,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let positions = StrategyState::new();
        let status = Arc::new(RwLock::new(
            positions.status(&settings.symbol, manager.config().max_positions),
        ));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            status: status.clone(),
        };

        let engine = Engine {
            settings,
            strategy,
            manager,
            executor,
            positions,
            paused: false,
            state,
            status,
            command_rx,
        };

        (engine, handle)
    }

    pub fn positions(&self) -> &StrategyState {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut StrategyState {
        &mut self.positions
    }

    /// Start-up checks. An unreachable account is fatal; a missing price or
    /// a failed order cancellation is only logged.
    pub async fn initialize(&self) -> Result<()> {
        let client = self.executor.client();
        let symbol = &self.settings.symbol;

        let balance = client.wallet_balance(SETTLEMENT_COIN).await?;
        info!(coin = SETTLEMENT_COIN, balance, "Exchange account reachable");

        match client.current_price(symbol).await {
            Ok(price) => info!(symbol = %symbol, price, "Current price"),
            Err(e) => warn!(symbol = %symbol, error = %e, "Could not fetch current price"),
        }

        if let Err(e) = client.cancel_all_orders(symbol).await {
            warn!(symbol = %symbol, error = %e, "Could not cancel stale orders");
        }

        info!(strategy = %self.strategy.name(), symbol = %symbol, "Engine initialized");
        Ok(())
    }

    /// Run cycles until a `Stop` command arrives or every handle is dropped,
    /// then close all positions. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        *self.state.write().await = EngineState::Running;
        info!(symbol = %self.settings.symbol, interval = ?self.settings.cycle_interval, "Strategy loop running");

        let next_cycle = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_cycle);

        loop {
            tokio::select! {
                // Commands queued during a cycle are handled before the next one.
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Pause) => {
                            if !self.paused {
                                info!("Engine paused, exits still evaluated and entries suppressed");
                                self.paused = true;
                                *self.state.write().await = EngineState::Paused;
                            }
                        }
                        Some(EngineCommand::Resume) => {
                            if self.paused {
                                info!("Engine resumed");
                                self.paused = false;
                                *self.state.write().await = EngineState::Running;
                            }
                        }
                        Some(EngineCommand::Stop) => {
                            info!("Stop requested");
                            break;
                        }
                        None => {
                            warn!("Engine command channel closed, shutting down");
                            break;
                        }
                    }
                }

                () = &mut next_cycle => {
                    let report = self.run_cycle(Utc::now()).await;
                    self.publish_status().await;

                    let mut delay = self.settings.cycle_interval;
                    if report.degraded {
                        warn!(backoff = ?self.settings.error_backoff, "Exchange errors this cycle, backing off");
                        delay += self.settings.error_backoff;
                    }
                    next_cycle.as_mut().reset(Instant::now() + delay);
                }
            }
        }

        self.shutdown().await;
        self.publish_status().await;
        *self.state.write().await = EngineState::Stopped;
    }

    /// One full cycle: price, then exits, then entry.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let symbol = self.settings.symbol.clone();

        let price = match self.executor.client().current_price(&symbol).await {
            Ok(price) if is_tradable_price(price) => price,
            Ok(price) => {
                warn!(symbol = %symbol, price, "Unusable price, skipping cycle");
                report.degraded = true;
                return report;
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Price unavailable, skipping cycle");
                report.degraded = true;
                return report;
            }
        };
        report.price = Some(price);

        self.process_exits(price, now, &mut report).await;

        if self.paused {
            debug!("Paused, skipping entry evaluation");
            return report;
        }
        self.process_entry(price, now, &mut report).await;

        report
    }

    async fn process_exits(&mut self, price: f64, now: DateTime<Utc>, report: &mut CycleReport) {
        for (id, reason) in self.manager.positions_to_close(&self.positions, price, now) {
            let Some(position) = self.positions.get(id).cloned() else {
                continue;
            };
            info!(id = %id, side = %position.side, price, reason = %reason, "Closing position");

            match self.executor.close(&position).await {
                Ok(_) => {
                    self.positions.remove(id);
                    report.closed.push((id, reason));
                }
                // Position stays tracked and is re-evaluated next cycle.
                Err(_) => report.degraded = true,
            }
        }
    }

    async fn process_entry(&mut self, price: f64, now: DateTime<Utc>, report: &mut CycleReport) {
        let client = self.executor.client().clone();
        let strategy = &self.strategy;
        let settings = &self.settings;
        let mut fetch_failed = false;
        let failed = &mut fetch_failed;

        // Candles are only fetched once the capacity and cooldown gates pass.
        let decision = self
            .manager
            .should_open(&mut self.positions, now, move || async move {
                let candles = match client
                    .candles(&settings.symbol, &settings.candle_interval, settings.candle_window)
                    .await
                {
                    Ok(candles) => candles,
                    Err(e) => {
                        warn!(symbol = %settings.symbol, error = %e, "Candle fetch failed");
                        *failed = true;
                        Vec::new()
                    }
                };
                (!candles.is_empty()).then(|| strategy.analyze(&candles))
            })
            .await;
        report.degraded |= fetch_failed;

        if let EntryDecision::Open { side, strength, reason } = &decision {
            info!(side = %side, strength, reason = %reason, "Opening position");
            match self.executor.open(*side, self.settings.quantity, price, now).await {
                Ok(position) => report.opened = self.positions.insert(position),
                Err(_) => report.degraded = true,
            }
        } else {
            debug!(reason = %decision, "No entry");
        }

        report.entry = Some(decision);
    }

    /// Close every tracked position and cancel resting orders.
    pub async fn shutdown(&mut self) {
        info!(open = self.positions.len(), "Shutting down, closing all positions");

        for id in self.positions.ids() {
            let Some(position) = self.positions.get(id).cloned() else {
                continue;
            };
            if self.executor.close(&position).await.is_ok() {
                self.positions.remove(id);
            }
        }

        if let Err(e) = self
            .executor
            .client()
            .cancel_all_orders(&self.settings.symbol)
            .await
        {
            warn!(symbol = %self.settings.symbol, error = %e, "Order cancellation failed during shutdown");
        }

        if self.positions.is_empty() {
            info!("Shutdown complete");
        } else {
            warn!(remaining = self.positions.len(), "Shutdown left positions open");
        }
    }

    async fn publish_status(&self) {
        let status = self
            .positions
            .status(&self.settings.symbol, self.manager.config().max_positions);
        info!(
            active = status.active_positions,
            max = status.max_positions,
            last_signal = ?status.last_signal_at,
            "Status"
        );
        *self.status.write().await = status;
    }
}
