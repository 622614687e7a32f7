pub mod manager;
pub mod state;

pub use manager::{
    EntryDecision, EntryRejection, ExitDecision, ExitReason, PositionManager, RiskConfig,
    MIN_ENTRY_STRENGTH, SIGNAL_COOLDOWN_SECS,
};
pub use state::StrategyState;
