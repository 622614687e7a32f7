use common::MacdValues;

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow) over the whole window.
///
/// The signal line is the EMA of a one-element series holding the current
/// MACD line, so it always equals the line and the histogram is always zero.
/// Downstream scoring depends on this; a rolling MACD history would change
/// every crossover decision.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdIndicator {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    /// Compute MACD from a slice of close prices (oldest first).
    /// Returns all zeros with fewer than `slow` closes.
    pub fn compute(&self, closes: &[f64]) -> MacdValues {
        if closes.len() < self.slow {
            return MacdValues::default();
        }

        let line = ema(closes, self.fast) - ema(closes, self.slow);
        let signal = ema(std::slice::from_ref(&line), self.signal);

        MacdValues {
            line,
            signal,
            histogram: line - signal,
        }
    }
}

/// Exponential moving average over `data`, seeded with its first element.
///
/// Every call restarts from the start of the given window; there is no
/// long-run seed. With fewer than `period` values the last value is
/// returned unchanged, and an empty slice yields 0.0.
pub fn ema(data: &[f64], period: usize) -> f64 {
    let Some(&last) = data.last() else {
        return 0.0;
    };
    if data.len() < period {
        return last;
    }

    let k = 2.0 / (period as f64 + 1.0);
    data[1..]
        .iter()
        .fold(data[0], |ema_val, &price| price * k + ema_val * (1.0 - k))
}
