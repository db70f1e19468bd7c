//! Configuration management for wbvoice.
//!
//! Loaded once at startup from a TOML file in the user's config directory.

pub mod file;

pub use file::{config_path, AudioConfig, VoiceConfig};
