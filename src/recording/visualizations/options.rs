//! Visualizer tuning, read once before a session starts.

use serde::{Deserialize, Serialize};

use crate::recording::error::{RecordingError, Result};

/// Level meter and spectrum analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerOptions {
    /// Number of log-spaced frequency bands
    #[serde(default = "default_band_count")]
    pub band_count: usize,
    /// Analyzer polls per second
    #[serde(default = "default_update_hz")]
    pub update_hz: u32,
    /// Samples per FFT block (power of two)
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Gain applied to RMS before clamping the level meter
    #[serde(default = "default_level_boost")]
    pub level_boost: f32,
    /// Smoothing factor when a band rises
    #[serde(default = "default_attack")]
    pub attack: f32,
    /// Smoothing factor when a band falls
    #[serde(default = "default_release")]
    pub release: f32,
    /// Run the spectrum analyzer (the level meter is always on)
    #[serde(default = "default_true")]
    pub spectrum_enabled: bool,
}

fn default_band_count() -> usize {
    12
}

fn default_update_hz() -> u32 {
    20
}

fn default_fft_size() -> usize {
    1024
}

fn default_level_boost() -> f32 {
    4.0
}

fn default_attack() -> f32 {
    0.6
}

fn default_release() -> f32 {
    0.9
}

fn default_true() -> bool {
    true
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self {
            band_count: default_band_count(),
            update_hz: default_update_hz(),
            fft_size: default_fft_size(),
            level_boost: default_level_boost(),
            attack: default_attack(),
            release: default_release(),
            spectrum_enabled: default_true(),
        }
    }
}

impl VisualizerOptions {
    /// Rejects settings the analyzer cannot run with.
    ///
    /// # Errors
    /// - If the FFT size is not a power of two
    /// - If band count or update rate is zero
    /// - If a smoothing factor is outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() {
            return Err(RecordingError::InvalidFftSize(self.fft_size));
        }
        if self.band_count == 0 {
            return Err(RecordingError::InvalidConfig(
                "band count must be greater than zero".to_string(),
            ));
        }
        if self.update_hz == 0 {
            return Err(RecordingError::InvalidConfig(
                "update rate must be greater than zero".to_string(),
            ));
        }
        for (name, factor) in [("attack", self.attack), ("release", self.release)] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(RecordingError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {factor}"
                )));
            }
        }
        Ok(())
    }

    /// Applies `WBVOICE_VIZ_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Numeric values must parse and be positive to take effect. A
    /// non-power-of-two FFT size falls back to the default.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let positive_usize = |key: &str| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
        };
        let positive_f32 = |key: &str| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<f32>().ok())
                .filter(|v| *v > 0.0)
        };

        if let Some(v) = positive_usize("WBVOICE_VIZ_BANDS") {
            self.band_count = v;
        }
        if let Some(v) = positive_usize("WBVOICE_VIZ_UPDATE_HZ") {
            self.update_hz = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = positive_usize("WBVOICE_VIZ_FFT_SIZE") {
            self.fft_size = if v.is_power_of_two() {
                v
            } else {
                tracing::warn!("Ignoring FFT size {} (not a power of two)", v);
                default_fft_size()
            };
        }
        if let Some(v) = positive_f32("WBVOICE_VIZ_LEVEL_BOOST") {
            self.level_boost = v;
        }
        if let Some(v) = positive_f32("WBVOICE_VIZ_ATTACK") {
            self.attack = v;
        }
        if let Some(v) = positive_f32("WBVOICE_VIZ_RELEASE") {
            self.release = v;
        }
        if let Some(raw) = lookup("WBVOICE_VIZ_SPECTRUM") {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.spectrum_enabled = ["1", "true", "yes"]
                    .iter()
                    .any(|accepted| raw.eq_ignore_ascii_case(accepted));
            }
        }
    }

    /// Interval between analyzer polls.
    pub fn update_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.update_hz.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let options = VisualizerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.band_count, 12);
        assert_eq!(options.fft_size, 1024);
        assert_eq!(options.update_interval(), std::time::Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_bad_fft_size() {
        let options = VisualizerOptions {
            fft_size: 1000,
            ..VisualizerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(RecordingError::InvalidFftSize(1000))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_smoothing() {
        let options = VisualizerOptions {
            release: 1.5,
            ..VisualizerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(RecordingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut options = VisualizerOptions::default();
        options.apply_overrides(lookup(&[
            ("WBVOICE_VIZ_BANDS", "24"),
            ("WBVOICE_VIZ_UPDATE_HZ", "-3"),
            ("WBVOICE_VIZ_FFT_SIZE", "2048"),
            ("WBVOICE_VIZ_LEVEL_BOOST", "abc"),
            ("WBVOICE_VIZ_ATTACK", "0.5"),
            ("WBVOICE_VIZ_SPECTRUM", "No"),
        ]));

        assert_eq!(options.band_count, 24);
        assert_eq!(options.update_hz, 20);
        assert_eq!(options.fft_size, 2048);
        assert_eq!(options.level_boost, 4.0);
        assert_eq!(options.attack, 0.5);
        assert!(!options.spectrum_enabled);
    }

    #[test]
    fn test_non_power_of_two_override_falls_back() {
        let mut options = VisualizerOptions {
            fft_size: 4096,
            ..VisualizerOptions::default()
        };
        options.apply_overrides(lookup(&[("WBVOICE_VIZ_FFT_SIZE", "1500"), ("WBVOICE_VIZ_SPECTRUM", "YES")]));
        assert_eq!(options.fft_size, 1024);
        assert!(options.spectrum_enabled);
    }
}
