use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated OHLCV bucket from the exchange.
/// Series of candles are always passed oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub start_time: DateTime<Utc>,
}

/// Side of an order as sent to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bybit expects capitalised side names.
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position in this direction.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position in this direction.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// A market order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client-generated link id, echoed back by the exchange.
    pub link_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Closing orders must never flip the position.
    pub reduce_only: bool,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            link_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            reduce_only: false,
        }
    }

    pub fn closing(symbol: impl Into<String>, side: PositionSide, quantity: f64) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(symbol, side.exit_order_side(), quantity)
        }
    }
}

/// Confirmation of an accepted order returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    /// `None` when the exchange does not report the execution price
    /// synchronously (Bybit market orders).
    pub fill_price: Option<f64>,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Discrete trading signal produced by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Position direction this signal asks for, if any.
    pub fn position_side(self) -> Option<PositionSide> {
        match self {
            Signal::Buy => Some(PositionSide::Long),
            Signal::Sell => Some(PositionSide::Short),
            Signal::Hold => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Degenerate bands collapsed onto a single price.
    pub fn flat(price: f64) -> Self {
        Self {
            upper: price,
            middle: price,
            lower: price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdValues {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Indicator values computed for one analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub bollinger: BollingerBands,
    pub macd: MacdValues,
    pub current_price: f64,
}

/// Output of one analysis pass over a candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub signal: Signal,
    /// Absolute value of the signed score.
    pub strength: f64,
    /// Fragments from every rule that contributed to the score.
    pub reasons: Vec<String>,
    /// `None` when the window was too short to compute indicators.
    pub indicators: Option<IndicatorSnapshot>,
}

impl SignalResult {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Hold,
            strength: 0.0,
            reasons: vec![reason.into()],
            indicators: None,
        }
    }

    pub fn reason(&self) -> String {
        if self.reasons.is_empty() {
            "no clear signals".to_string()
        } else {
            self.reasons.join("; ")
        }
    }
}

/// A price the strategy can act on: finite and strictly positive.
pub fn is_tradable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Key of a position inside the strategy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open position created from a confirmed entry fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    pub order_id: String,
}

impl Position {
    /// Fractional profit or loss at `price`, sign-adjusted for the side.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - price) / self.entry_price,
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the strategy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the strategy loop via its handle.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Pause,
    Resume,
    Stop,
}

/// Snapshot of the strategy state published after every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub symbol: String,
    pub active_positions: usize,
    pub max_positions: usize,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub positions: Vec<(PositionId, Position)>,
}
