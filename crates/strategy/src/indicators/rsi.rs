/// Value returned when there is not enough data to compute RSI.
pub const RSI_NEUTRAL: f64 = 50.0;

/// Value returned when the window has gains but no losses.
pub const RSI_ZERO_LOSS: f64 = 100.0;

/// Value returned when the window has neither gains nor losses.
///
/// A flat window would hit the zero-loss branch; it is reported as neutral
/// instead of fully overbought.
pub const FLAT_MARKET_RSI: f64 = RSI_NEUTRAL;

/// RSI (Relative Strength Index) indicator.
///
/// Averages gains and losses over the *first* `period` price changes of the
/// window with a simple mean (no Wilder smoothing). Returns [`RSI_NEUTRAL`]
/// until at least `period + 1` closes are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiIndicator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period, overbought, oversold }
    }

    /// Compute RSI from a slice of close prices (oldest first).
    pub fn compute(&self, closes: &[f64]) -> f64 {
        if closes.len() < self.period + 1 {
            return RSI_NEUTRAL;
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        if avg_loss == 0.0 {
            return if avg_gain == 0.0 { FLAT_MARKET_RSI } else { RSI_ZERO_LOSS };
        }

        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }

    pub fn is_oversold(&self, rsi: f64) -> bool {
        rsi < self.oversold
    }

    pub fn is_overbought(&self, rsi: f64) -> bool {
        rsi > self.overbought
    }
}
