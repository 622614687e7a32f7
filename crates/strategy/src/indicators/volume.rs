/// Flags candles whose volume clearly exceeds the recent average.
#[derive(Debug, Clone)]
pub struct VolumeIndicator {
    pub lookback: usize,
    pub spike_factor: f64,
}

impl Default for VolumeIndicator {
    fn default() -> Self {
        Self::new(20, 1.5)
    }
}

impl VolumeIndicator {
    pub fn new(lookback: usize, spike_factor: f64) -> Self {
        assert!(lookback >= 1, "volume lookback must be >= 1");
        Self { lookback, spike_factor }
    }

    /// True when the latest volume exceeds `spike_factor` times the mean of
    /// the last `lookback` volumes (the latest one included).
    pub fn is_spike(&self, volumes: &[f64]) -> bool {
        let Some(&current) = volumes.last() else {
            return false;
        };
        let window = &volumes[volumes.len().saturating_sub(self.lookback)..];
        let average = window.iter().sum::<f64>() / window.len() as f64;
        current > average * self.spike_factor
    }
}
