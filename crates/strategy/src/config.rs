use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Indicator tuning loaded from an optional TOML file.
///
/// RSI period and thresholds come from the environment (`common::Config`);
/// everything else lives here. Example file:
/// ```toml
/// [bollinger]
/// period = 20
/// std_dev_multiplier = 2.0
///
/// [macd]
/// fast = 12
/// slow = 26
/// signal = 9
///
/// [volume]
/// lookback = 20
/// spike_factor = 1.5
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub bollinger: BollingerSettings,
    pub macd: MacdSettings,
    pub volume: VolumeSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BollingerSettings {
    pub period: usize,
    pub std_dev_multiplier: f64,
}

impl Default for BollingerSettings {
    fn default() -> Self {
        Self { period: 20, std_dev_multiplier: 2.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MacdSettings {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdSettings {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumeSettings {
    pub lookback: usize,
    pub spike_factor: f64,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self { lookback: 20, spike_factor: 1.5 }
    }
}

impl IndicatorSettings {
    /// Load from a TOML file, or defaults when no path is configured.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("Invalid strategy config at '{path}': {e}")))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.bollinger.period == 0 || self.volume.lookback == 0 {
            return Err(Error::Config("lookback periods must be at least 1".into()));
        }
        if self.macd.fast == 0 || self.macd.signal == 0 || self.macd.fast >= self.macd.slow {
            return Err(Error::Config(format!(
                "MACD periods must satisfy 0 < fast < slow (fast={}, slow={})",
                self.macd.fast, self.macd.slow
            )));
        }
        Ok(())
    }
}
