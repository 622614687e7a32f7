use std::str::FromStr;

use crate::{Error, Result, TradingMode};

/// Upper bound for `POSITION_TIMEOUT` (30 days).
pub const MAX_POSITION_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange
    pub trading_mode: TradingMode,
    pub bybit_api_key: String,
    pub bybit_secret: String,
    pub bybit_testnet: bool,

    // Trading
    pub symbol: String,
    pub quantity: f64,
    /// Fractional gain that closes a position (0.002 = 0.2%).
    pub profit_target: f64,
    /// Fractional loss that closes a position (0.001 = 0.1%).
    pub stop_loss: f64,
    pub max_positions: usize,

    // Indicators
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,

    // Timing
    /// Candle interval in Bybit notation ("1" = one minute).
    pub candle_interval: String,
    pub candle_window: usize,
    pub position_timeout_secs: u64,
    pub cycle_interval_secs: u64,
    pub error_backoff_secs: u64,

    // Paper trading
    pub paper_slippage_bps: f64,
    pub paper_balance_usd: f64,

    /// Optional TOML file with indicator tuning.
    pub strategy_config_path: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate a config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let trading_mode = match env
            .string("TRADING_MODE", "paper")
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let config = Config {
            trading_mode,
            bybit_api_key: env.string("BYBIT_API_KEY", ""),
            bybit_secret: env.string("BYBIT_SECRET_KEY", ""),
            bybit_testnet: env.string("BYBIT_TESTNET", "true").eq_ignore_ascii_case("true"),
            symbol: env.string("SYMBOL", "BTCUSDT"),
            quantity: env.parse("QUANTITY", 0.001)?,
            profit_target: env.parse("PROFIT_TARGET", 0.002)?,
            stop_loss: env.parse("STOP_LOSS", 0.001)?,
            max_positions: env.parse("MAX_POSITIONS", 3)?,
            rsi_period: env.parse("RSI_PERIOD", 14)?,
            rsi_overbought: env.parse("RSI_OVERBOUGHT", 70.0)?,
            rsi_oversold: env.parse("RSI_OVERSOLD", 30.0)?,
            candle_interval: env.string("CANDLE_INTERVAL", "1"),
            candle_window: env.parse("CANDLE_WINDOW", 100)?,
            position_timeout_secs: env.parse("POSITION_TIMEOUT", 300)?,
            cycle_interval_secs: env.parse("CYCLE_INTERVAL_SECS", 10)?,
            error_backoff_secs: env.parse("ERROR_BACKOFF_SECS", 30)?,
            paper_slippage_bps: env.parse("PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_balance_usd: env.parse("PAPER_BALANCE_USD", 10_000.0)?,
            strategy_config_path: env.optional("STRATEGY_CONFIG_PATH"),
            log_level: env.string("LOG_LEVEL", "info"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the strategy cannot trade with.
    pub fn validate(&self) -> Result<()> {
        if self.trading_mode == TradingMode::Live
            && (self.bybit_api_key.is_empty() || self.bybit_secret.is_empty())
        {
            return Err(Error::Config(
                "BYBIT_API_KEY and BYBIT_SECRET_KEY must be set in live mode".into(),
            ));
        }
        if self.quantity <= 0.0 {
            return Err(Error::Config("QUANTITY must be greater than 0".into()));
        }
        if self.profit_target <= 0.0 || self.stop_loss <= 0.0 {
            return Err(Error::Config(
                "PROFIT_TARGET and STOP_LOSS must be greater than 0".into(),
            ));
        }
        if self.max_positions == 0 {
            return Err(Error::Config("MAX_POSITIONS must be at least 1".into()));
        }
        if self.rsi_period < 2 {
            return Err(Error::Config("RSI_PERIOD must be at least 2".into()));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(Error::Config(format!(
                "RSI_OVERSOLD ({}) must be below RSI_OVERBOUGHT ({})",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        if self.position_timeout_secs > MAX_POSITION_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "POSITION_TIMEOUT must be at most {MAX_POSITION_TIMEOUT_SECS} seconds, got {}",
                self.position_timeout_secs
            )));
        }
        if self.cycle_interval_secs == 0 {
            return Err(Error::Config("CYCLE_INTERVAL_SECS must be at least 1".into()));
        }
        Ok(())
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("{key} has an invalid value: '{raw}'"))
            }),
            None => Ok(default),
        }
    }
}
