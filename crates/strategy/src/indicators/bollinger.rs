use common::BollingerBands;

/// Bollinger Bands: SMA ± `std_dev_multiplier` population standard deviations
/// over the last `period` closes.
#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    pub period: usize,
    pub std_dev_multiplier: f64,
}

impl Default for BollingerIndicator {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl BollingerIndicator {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self { period, std_dev_multiplier }
    }

    /// Compute the bands from close prices (oldest first).
    /// With fewer than `period` closes all three bands equal the last close.
    pub fn compute(&self, closes: &[f64]) -> BollingerBands {
        let last = closes.last().copied().unwrap_or(0.0);
        if closes.len() < self.period {
            return BollingerBands::flat(last);
        }

        let window = &closes[closes.len() - self.period..];
        let n = window.len() as f64;
        let middle = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / n;
        let width = variance.sqrt() * self.std_dev_multiplier;

        BollingerBands {
            upper: middle + width,
            middle,
            lower: middle - width,
        }
    }
}
