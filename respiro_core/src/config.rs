//! Configuration file support for RespiroSync.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/respiro/config.toml`.
//! Every threshold the pipeline uses lives here with a documented default;
//! a partial file only overrides the keys it names.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub breath: BreathConfig,

    #[serde(default)]
    pub movement: MovementConfig,

    #[serde(default)]
    pub apnea: ApneaConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Sample retention per sensor stream
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples older than this (relative to the newest) are evicted
    pub retention_ms: u64,
    /// Hard cap on retained samples, whatever the sample rate
    pub max_samples: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retention_ms: 180_000,
            max_samples: 16_384,
        }
    }
}

/// Respiratory band filtering and sensor fusion
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Drift/gravity removal cutoff
    pub highpass_cutoff_hz: f32,
    /// Noise suppression cutoff, top of the breathing band
    pub lowpass_cutoff_hz: f32,
    pub accel_weight: f32,
    pub gyro_weight: f32,
    /// Window for raw movement-energy variance
    pub movement_window_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            highpass_cutoff_hz: 0.05,
            lowpass_cutoff_hz: 0.6,
            accel_weight: 0.75,
            gyro_weight: 0.25,
            movement_window_ms: 2_000,
        }
    }
}

/// Breath cycle detection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreathConfig {
    /// Window for the rolling max/min that drives the adaptive threshold
    pub range_window_ms: u64,
    /// Hysteresis half-width as a fraction of half the rolling range
    pub threshold_fraction: f32,
    /// Below this peak-to-trough range the signal is treated as flat
    pub min_amplitude: f32,
    /// Minimum spacing between accepted cycle starts
    pub refractory_ms: u64,
    /// Longer intervals are gaps, not breaths, and stay out of the statistics
    pub max_interval_ms: u64,
    /// Number of intervals (and cycles) kept for rate/regularity
    pub history_len: usize,
}

impl Default for BreathConfig {
    fn default() -> Self {
        Self {
            range_window_ms: 10_000,
            threshold_fraction: 0.3,
            min_amplitude: 0.01,
            refractory_ms: 1_500,
            max_interval_ms: 20_000,
            history_len: 16,
        }
    }
}

/// Movement intensity normalization
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Movement energy at which intensity saturates at 1.0
    pub saturation_energy: f32,
    pub smoothing_window_ms: u64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            saturation_energy: 0.25,
            smoothing_window_ms: 1_500,
        }
    }
}

/// Apnea gap detection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApneaConfig {
    pub gap_threshold_ms: u64,
    /// Movement at or above this during the gap explains the missing cycles
    pub low_movement_threshold: f32,
}

impl Default for ApneaConfig {
    fn default() -> Self {
        Self {
            gap_threshold_ms: 12_000,
            low_movement_threshold: 0.15,
        }
    }
}

/// Sleep stage classification and hysteresis
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub warmup_ms: u64,
    pub evaluation_interval_ms: u64,
    pub min_dwell_ms: u64,
    pub confirmation_ms: u64,
    pub awake_movement_threshold: f32,
    pub sleep_movement_threshold: f32,
    pub deep_rate_min_bpm: f32,
    pub deep_rate_max_bpm: f32,
    pub deep_min_regularity: f32,
    pub rem_rate_min_bpm: f32,
    pub rem_rate_max_bpm: f32,
    pub rem_min_regularity: f32,
    pub rem_max_regularity: f32,
    /// Applied to confidence while a challenger stage awaits confirmation
    pub pending_confidence_discount: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 120_000,
            evaluation_interval_ms: 1_000,
            min_dwell_ms: 60_000,
            confirmation_ms: 15_000,
            awake_movement_threshold: 0.4,
            sleep_movement_threshold: 0.15,
            deep_rate_min_bpm: 8.0,
            deep_rate_max_bpm: 14.0,
            deep_min_regularity: 0.85,
            rem_rate_min_bpm: 16.0,
            rem_rate_max_bpm: 25.0,
            rem_min_regularity: 0.4,
            rem_max_regularity: 0.8,
            pending_confidence_discount: 0.5,
        }
    }
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn positive(name: &str, value: f32) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::Config(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}

fn band(name: &str, min: f32, max: f32) -> Result<()> {
    if !(min.is_finite() && max.is_finite() && min < max) {
        return Err(Error::Config(format!(
            "{} band is empty: [{}, {}]",
            name, min, max
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("respiro").join("config.toml")
    }

    /// Save the configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Render as a complete TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Check that every threshold is usable.
    ///
    /// Sessions refuse to start on a config that fails here.
    pub fn validate(&self) -> Result<()> {
        let s = &self.stream;
        if s.retention_ms == 0 || s.max_samples == 0 {
            return Err(Error::Config(
                "stream retention and sample cap must be non-zero".into(),
            ));
        }

        let f = &self.filter;
        positive("filter.highpass_cutoff_hz", f.highpass_cutoff_hz)?;
        positive("filter.lowpass_cutoff_hz", f.lowpass_cutoff_hz)?;
        if f.lowpass_cutoff_hz <= f.highpass_cutoff_hz {
            return Err(Error::Config(format!(
                "filter.lowpass_cutoff_hz ({}) must exceed highpass_cutoff_hz ({})",
                f.lowpass_cutoff_hz, f.highpass_cutoff_hz
            )));
        }
        unit_interval("filter.accel_weight", f.accel_weight)?;
        unit_interval("filter.gyro_weight", f.gyro_weight)?;
        if f.accel_weight + f.gyro_weight <= 0.0 {
            return Err(Error::Config("filter weights cannot both be zero".into()));
        }
        if f.movement_window_ms == 0 || f.movement_window_ms > s.retention_ms {
            return Err(Error::Config(format!(
                "filter.movement_window_ms must be within (0, {}]",
                s.retention_ms
            )));
        }

        let b = &self.breath;
        if b.range_window_ms == 0 {
            return Err(Error::Config("breath.range_window_ms must be non-zero".into()));
        }
        positive("breath.threshold_fraction", b.threshold_fraction)?;
        if b.threshold_fraction >= 1.0 {
            return Err(Error::Config(
                "breath.threshold_fraction must be below 1".into(),
            ));
        }
        positive("breath.min_amplitude", b.min_amplitude)?;
        if b.max_interval_ms <= b.refractory_ms {
            return Err(Error::Config(
                "breath.max_interval_ms must exceed breath.refractory_ms".into(),
            ));
        }
        if b.history_len < 2 {
            return Err(Error::Config("breath.history_len must be at least 2".into()));
        }

        positive("movement.saturation_energy", self.movement.saturation_energy)?;
        if self.movement.smoothing_window_ms == 0 {
            return Err(Error::Config(
                "movement.smoothing_window_ms must be non-zero".into(),
            ));
        }

        unit_interval("apnea.low_movement_threshold", self.apnea.low_movement_threshold)?;
        if self.apnea.gap_threshold_ms == 0 {
            return Err(Error::Config("apnea.gap_threshold_ms must be non-zero".into()));
        }

        let c = &self.classifier;
        if c.evaluation_interval_ms == 0 {
            return Err(Error::Config(
                "classifier.evaluation_interval_ms must be non-zero".into(),
            ));
        }
        unit_interval("classifier.awake_movement_threshold", c.awake_movement_threshold)?;
        unit_interval("classifier.sleep_movement_threshold", c.sleep_movement_threshold)?;
        if c.sleep_movement_threshold > c.awake_movement_threshold {
            return Err(Error::Config(
                "classifier.sleep_movement_threshold must not exceed awake_movement_threshold"
                    .into(),
            ));
        }
        band("classifier.deep_rate", c.deep_rate_min_bpm, c.deep_rate_max_bpm)?;
        band("classifier.rem_rate", c.rem_rate_min_bpm, c.rem_rate_max_bpm)?;
        unit_interval("classifier.deep_min_regularity", c.deep_min_regularity)?;
        unit_interval("classifier.rem_min_regularity", c.rem_min_regularity)?;
        unit_interval("classifier.rem_max_regularity", c.rem_max_regularity)?;
        band(
            "classifier.rem_regularity",
            c.rem_min_regularity,
            c.rem_max_regularity,
        )?;
        unit_interval(
            "classifier.pending_confidence_discount",
            c.pending_confidence_discount,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.warmup_ms, 120_000);
        assert_eq!(config.breath.refractory_ms, 1_500);
        assert_eq!(config.apnea.gap_threshold_ms, 12_000);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[classifier]
min_dwell_ms = 90000
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.classifier.min_dwell_ms, 90_000);
        assert_eq!(config.classifier.confirmation_ms, 15_000); // default
        assert_eq!(config.breath, BreathConfig::default());
    }

    #[test]
    fn test_save_and_load_from_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.apnea.gap_threshold_ms = 15_000;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.apnea.gap_threshold_ms, 15_000);
    }

    #[test]
    fn test_validate_rejects_inverted_filter_band() {
        let mut config = Config::default();
        config.filter.lowpass_cutoff_hz = 0.01;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = Config::default();
        config.classifier.sleep_movement_threshold = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.breath.threshold_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.deep_rate_min_bpm = 20.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.breath.history_len = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_toml_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[classifier\nwarmup_ms = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Toml(_))));
    }
}
