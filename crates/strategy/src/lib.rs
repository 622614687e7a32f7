pub mod analyzer;
pub mod config;
pub mod indicators;

pub use analyzer::{SignalAnalyzer, MIN_CANDLES, SIGNAL_THRESHOLD};
pub use config::IndicatorSettings;

use common::{Candle, SignalResult};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Score the latest candle window (oldest first).
    ///
    /// Windows that are too short yield a HOLD result rather than an error.
    fn analyze(&self, candles: &[Candle]) -> SignalResult;
}
