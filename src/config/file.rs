//! Configuration file loading for wbvoice.
//!
//! Settings live in `~/.config/wbvoice/wbvoice.toml`. Every field has a default,
//! so a missing file or a partial file is fine. Visualizer settings can be
//! overridden from the environment after the file is read.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::recording::{AudioFormat, RecordingOptions, VisualizerOptions};

/// Audio capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `wbvoice list-devices`
    /// - device name from `wbvoice list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Recording sample rate in Hz (16000 recommended for speech)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Longest recording in seconds, 0 for no limit
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    /// Largest PCM payload in bytes, 0 for no limit
    #[serde(default)]
    pub max_bytes: u64,
    /// Frames the device is asked to deliver per callback
    #[serde(default = "default_frames_per_buffer")]
    pub frames_per_buffer: u32,
    /// Where recordings are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File name prefix for recordings
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration_secs() -> u64 {
    300
}

fn default_frames_per_buffer() -> u32 {
    1024
}

fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wbvoice")
        .join("recordings")
}

fn default_file_prefix() -> String {
    "voice".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration_secs(),
            max_bytes: 0,
            frames_per_buffer: default_frames_per_buffer(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::mono(self.sample_rate)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Session options for this configuration, without a tap.
    pub fn recording_options(&self) -> RecordingOptions {
        let mut options = RecordingOptions::new(self.format(), self.output_dir.clone())
            .with_limits(self.max_duration(), self.max_bytes)
            .with_prefix(self.file_prefix.clone());
        options.frames_per_buffer = self.frames_per_buffer;
        options
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub visualizer: VisualizerOptions,
}

impl VoiceConfig {
    /// Loads the user's configuration and applies environment overrides.
    ///
    /// # Errors
    /// - If the home directory cannot be determined
    /// - If the file exists but cannot be read or parsed
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&config_path()?)?;
        config.visualizer.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// - If the file exists but cannot be read
    /// - If the TOML is malformed
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(anyhow!("Failed to read {}: {e}", path.display())),
        };
        Self::from_toml(&content).map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    /// - If the TOML is malformed or a field has the wrong type
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Path of the configuration file.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".config").join("wbvoice").join("wbvoice.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = VoiceConfig::from_toml(
            r#"
[audio]
device = "USB Mic"
max_bytes = 64000

[visualizer]
band_count = 24
"#,
        )
        .unwrap();

        assert_eq!(config.audio.device, "USB Mic");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.max_duration_secs, 300);
        assert_eq!(config.audio.max_bytes, 64000);
        assert_eq!(config.visualizer.band_count, 24);
        assert_eq!(config.visualizer.fft_size, 1024);
        assert!(config.visualizer.spectrum_enabled);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = VoiceConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, VoiceConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wbvoice.toml");
        fs::write(&path, "[audio]\nsample_rate = \"fast\"\n").unwrap();
        assert!(VoiceConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_recording_options_from_audio_config() {
        let audio = AudioConfig {
            sample_rate: 8000,
            max_duration_secs: 2,
            max_bytes: 0,
            frames_per_buffer: 256,
            file_prefix: "memo".to_string(),
            ..AudioConfig::default()
        };
        let options = audio.recording_options();
        assert_eq!(options.format, AudioFormat::mono(8000));
        assert_eq!(options.max_duration, Duration::from_secs(2));
        assert_eq!(options.frames_per_buffer, 256);
        assert_eq!(options.file_prefix, "memo");
        assert!(options.tap.is_none());
    }
}
