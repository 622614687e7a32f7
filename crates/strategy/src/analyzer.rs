use tracing::debug;

use common::{Candle, Config, IndicatorSnapshot, Signal, SignalResult};

use crate::config::IndicatorSettings;
use crate::indicators::{BollingerIndicator, MacdIndicator, RsiIndicator, VolumeIndicator};
use crate::Strategy;

/// Windows shorter than this are never scored.
pub const MIN_CANDLES: usize = 50;

/// Score magnitude at which the analyzer commits to a direction.
pub const SIGNAL_THRESHOLD: f64 = 2.0;

const RSI_WEIGHT: f64 = 2.0;
const BOLLINGER_WEIGHT: f64 = 1.0;
const MACD_WEIGHT: f64 = 1.0;
const VOLUME_BONUS: f64 = 0.5;

/// Scores one candle window with RSI, Bollinger Bands, MACD and a volume
/// confirmation, and turns the score into a BUY / SELL / HOLD signal.
///
/// Score contributions:
/// - RSI below oversold +2, above overbought −2
/// - close below the lower band +1, above the upper band −1
/// - MACD above its signal line with a positive histogram +1, the mirror −1
/// - volume spike +0.5 regardless of direction
#[derive(Debug, Clone)]
pub struct SignalAnalyzer {
    rsi: RsiIndicator,
    bollinger: BollingerIndicator,
    macd: MacdIndicator,
    volume: VolumeIndicator,
}

impl SignalAnalyzer {
    pub fn new(
        rsi: RsiIndicator,
        bollinger: BollingerIndicator,
        macd: MacdIndicator,
        volume: VolumeIndicator,
    ) -> Self {
        Self { rsi, bollinger, macd, volume }
    }

    pub fn from_config(cfg: &Config, settings: &IndicatorSettings) -> Self {
        Self::new(
            RsiIndicator::new(cfg.rsi_period, cfg.rsi_overbought, cfg.rsi_oversold),
            BollingerIndicator::new(
                settings.bollinger.period,
                settings.bollinger.std_dev_multiplier,
            ),
            MacdIndicator::new(settings.macd.fast, settings.macd.slow, settings.macd.signal),
            VolumeIndicator::new(settings.volume.lookback, settings.volume.spike_factor),
        )
    }

    /// Analyze a candle window (oldest first).
    pub fn analyze(&self, candles: &[Candle]) -> SignalResult {
        if candles.len() < MIN_CANDLES {
            return SignalResult::hold("insufficient data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let snapshot = IndicatorSnapshot {
            rsi: self.rsi.compute(&closes),
            bollinger: self.bollinger.compute(&closes),
            macd: self.macd.compute(&closes),
            current_price: closes[closes.len() - 1],
        };

        let mut reasons = Vec::new();
        let mut score = 0.0;

        if self.rsi.is_oversold(snapshot.rsi) {
            reasons.push(format!("RSI oversold ({:.2})", snapshot.rsi));
            score += RSI_WEIGHT;
        } else if self.rsi.is_overbought(snapshot.rsi) {
            reasons.push(format!("RSI overbought ({:.2})", snapshot.rsi));
            score -= RSI_WEIGHT;
        }

        let price = snapshot.current_price;
        if price < snapshot.bollinger.lower {
            reasons.push("price below lower Bollinger band".to_string());
            score += BOLLINGER_WEIGHT;
        } else if price > snapshot.bollinger.upper {
            reasons.push("price above upper Bollinger band".to_string());
            score -= BOLLINGER_WEIGHT;
        }

        let macd = snapshot.macd;
        if macd.line > macd.signal && macd.histogram > 0.0 {
            reasons.push("MACD above signal line".to_string());
            score += MACD_WEIGHT;
        } else if macd.line < macd.signal && macd.histogram < 0.0 {
            reasons.push("MACD below signal line".to_string());
            score -= MACD_WEIGHT;
        }

        if self.volume.is_spike(&volumes) {
            reasons.push("elevated volume".to_string());
            score += VOLUME_BONUS;
        }

        let signal = classify(score);
        debug!(
            rsi = snapshot.rsi,
            bb_upper = snapshot.bollinger.upper,
            bb_lower = snapshot.bollinger.lower,
            macd = macd.line,
            price,
            score,
            signal = %signal,
            "Market analyzed"
        );

        SignalResult {
            signal,
            strength: score.abs(),
            reasons,
            indicators: Some(snapshot),
        }
    }
}

fn classify(score: f64) -> Signal {
    if score >= SIGNAL_THRESHOLD {
        Signal::Buy
    } else if score <= -SIGNAL_THRESHOLD {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

impl Strategy for SignalAnalyzer {
    fn name(&self) -> &str {
        "rsi-bollinger-macd scalper"
    }

    fn analyze(&self, candles: &[Candle]) -> SignalResult {
        SignalAnalyzer::analyze(self, candles)
    }
}
