pub mod bollinger;
pub mod macd;
pub mod rsi;
pub mod volume;

pub use bollinger::BollingerIndicator;
pub use macd::{ema, MacdIndicator};
pub use rsi::{RsiIndicator, FLAT_MARKET_RSI, RSI_NEUTRAL, RSI_ZERO_LOSS};
pub use volume::VolumeIndicator;
