use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{is_tradable_price, Config, Position, PositionId, PositionSide, SignalResult};

use crate::state::StrategyState;

/// Minimum time between two accepted entry signals. Compiled-in constant,
/// not user-configurable.
pub const SIGNAL_COOLDOWN_SECS: i64 = 60;

/// Signal strength required before an entry is accepted.
pub const MIN_ENTRY_STRENGTH: f64 = 2.0;

/// User-configurable position rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Gain on a single position that closes it (e.g. 0.002 = 0.2%).
    pub profit_target: f64,
    /// Loss on a single position that closes it (e.g. 0.001 = 0.1%).
    pub stop_loss: f64,
    /// Maximum simultaneous open positions.
    pub max_positions: usize,
    /// Positions held longer than this are closed regardless of PnL.
    pub position_timeout_secs: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            profit_target: 0.002,
            stop_loss: 0.001,
            max_positions: 3,
            position_timeout_secs: 300,
        }
    }
}

impl From<&Config> for RiskConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            profit_target: cfg.profit_target,
            stop_loss: cfg.stop_loss,
            max_positions: cfg.max_positions,
            position_timeout_secs: i64::try_from(cfg.position_timeout_secs).unwrap_or(i64::MAX),
        }
    }
}

/// Why a new entry was not taken.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryRejection {
    PositionLimitReached { active: usize, max: usize },
    CooldownActive { remaining_secs: i64 },
    NoMarketData,
    NoSignal(String),
}

impl std::fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryRejection::PositionLimitReached { active, max } => {
                write!(f, "position limit reached ({active}/{max})")
            }
            EntryRejection::CooldownActive { remaining_secs } => {
                write!(f, "cooldown active ({remaining_secs}s remaining)")
            }
            EntryRejection::NoMarketData => write!(f, "no candle data"),
            EntryRejection::NoSignal(reason) => write!(f, "no signal: {reason}"),
        }
    }
}

/// Outcome of the entry evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    Open {
        side: PositionSide,
        strength: f64,
        reason: String,
    },
    Skip(EntryRejection),
}

impl EntryDecision {
    pub fn should_open(&self) -> bool {
        matches!(self, EntryDecision::Open { .. })
    }
}

impl std::fmt::Display for EntryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDecision::Open { reason, .. } => write!(f, "{reason}"),
            EntryDecision::Skip(rejection) => write!(f, "{rejection}"),
        }
    }
}

/// Rule that closed a position.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    TakeProfit { pnl_pct: f64 },
    StopLoss { pnl_pct: f64 },
    Timeout { held_secs: i64 },
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit { pnl_pct } => write!(f, "take-profit: pnl {pnl_pct:.4}"),
            ExitReason::StopLoss { pnl_pct } => write!(f, "stop-loss: pnl {pnl_pct:.4}"),
            ExitReason::Timeout { held_secs } => write!(f, "timeout: held {held_secs}s"),
        }
    }
}

/// Outcome of evaluating one position against the exit rules.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitDecision {
    Close(ExitReason),
    Hold { pnl_pct: f64 },
    AlreadyClosed,
}

impl ExitDecision {
    pub fn should_close(&self) -> bool {
        matches!(self, ExitDecision::Close(_))
    }
}

impl std::fmt::Display for ExitDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitDecision::Close(reason) => write!(f, "{reason}"),
            ExitDecision::Hold { pnl_pct } => write!(f, "pnl {pnl_pct:.4}"),
            ExitDecision::AlreadyClosed => write!(f, "already closed"),
        }
    }
}

/// Entry gate and exit rules for one symbol.
///
/// Holds no mutable state of its own; every operation takes the
/// `StrategyState` it works on, so the owner of that state decides when
/// mutations happen.
#[derive(Debug, Clone)]
pub struct PositionManager {
    config: RiskConfig,
}

impl PositionManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Capacity and cooldown checks that run before any market analysis.
    pub fn entry_gate(
        &self,
        state: &StrategyState,
        now: DateTime<Utc>,
    ) -> Result<(), EntryRejection> {
        if state.len() >= self.config.max_positions {
            return Err(EntryRejection::PositionLimitReached {
                active: state.len(),
                max: self.config.max_positions,
            });
        }

        if let Some(last) = state.last_signal_at() {
            let elapsed = now - last;
            let cooldown = Duration::seconds(SIGNAL_COOLDOWN_SECS);
            if elapsed < cooldown {
                return Err(EntryRejection::CooldownActive {
                    remaining_secs: (cooldown - elapsed).num_seconds(),
                });
            }
        }

        Ok(())
    }

    /// Turn an analysis result into an entry decision.
    /// An accepted BUY/SELL starts a new cooldown window at `now`.
    pub fn evaluate_entry(
        &self,
        state: &mut StrategyState,
        result: &SignalResult,
        now: DateTime<Utc>,
    ) -> EntryDecision {
        match result.signal.position_side() {
            Some(side) if result.strength >= MIN_ENTRY_STRENGTH => {
                state.record_signal(now);
                EntryDecision::Open {
                    side,
                    strength: result.strength,
                    reason: format!("{}: {}", result.signal, result.reason()),
                }
            }
            _ => EntryDecision::Skip(EntryRejection::NoSignal(result.reason())),
        }
    }

    /// Full entry check. `analyze` only runs once both gates have passed and
    /// yields `None` when no market data could be fetched.
    pub async fn should_open<F, Fut>(
        &self,
        state: &mut StrategyState,
        now: DateTime<Utc>,
        analyze: F,
    ) -> EntryDecision
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<SignalResult>>,
    {
        if let Err(rejection) = self.entry_gate(state, now) {
            debug!(reason = %rejection, "Entry gated");
            return EntryDecision::Skip(rejection);
        }
        match analyze().await {
            Some(result) => self.evaluate_entry(state, &result, now),
            None => EntryDecision::Skip(EntryRejection::NoMarketData),
        }
    }

    /// Evaluate one position against take-profit, stop-loss and timeout,
    /// in that order.
    ///
    /// PnL rules need a usable entry and current price; without one only the
    /// timeout applies.
    pub fn should_close(
        &self,
        position: &Position,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> ExitDecision {
        if position.size == 0.0 {
            warn!(symbol = %position.symbol, order_id = %position.order_id, "Zero-size position in active set");
            return ExitDecision::AlreadyClosed;
        }

        let priced = is_tradable_price(position.entry_price) && is_tradable_price(current_price);
        let pnl_pct = if priced { position.pnl_pct(current_price) } else { 0.0 };

        if priced {
            if pnl_pct >= self.config.profit_target {
                return ExitDecision::Close(ExitReason::TakeProfit { pnl_pct });
            }
            if pnl_pct <= -self.config.stop_loss {
                return ExitDecision::Close(ExitReason::StopLoss { pnl_pct });
            }
        }

        // Out-of-range timeouts never fire.
        if let Some(limit) = Duration::try_seconds(self.config.position_timeout_secs) {
            let held = now - position.opened_at;
            if held > limit {
                return ExitDecision::Close(ExitReason::Timeout {
                    held_secs: held.num_seconds(),
                });
            }
        }

        ExitDecision::Hold { pnl_pct }
    }

    /// Every active position that must be closed at `current_price`.
    pub fn positions_to_close(
        &self,
        state: &StrategyState,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> Vec<(PositionId, ExitReason)> {
        state
            .positions()
            .filter_map(|(id, position)| match self.should_close(position, current_price, now) {
                ExitDecision::Close(reason) => Some((id, reason)),
                decision => {
                    debug!(id = %id, side = %position.side, status = %decision, "Position held");
                    None
                }
            })
            .collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
