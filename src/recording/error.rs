//! Error taxonomy for the capture and visualization core.

use thiserror::Error;

/// Errors surfaced by recording and visualization setup.
///
/// Only construction and `start` paths return these. Teardown never fails
/// from the caller's point of view.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("only mono recording is supported (got {0} channels)")]
    UnsupportedChannels(u16),

    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,

    #[error("FFT size must be a power of two (got {0})")]
    InvalidFftSize(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no audio input device available")]
    NoInputDevice,

    #[error("audio input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("audio input device does not support the requested format: {0}")]
    UnsupportedDevice(String),

    #[error("failed to initialize audio subsystem: {0}")]
    Subsystem(String),

    #[error("failed to open audio stream: {0}")]
    StreamBuild(String),

    #[error("audio stream control failed: {0}")]
    StreamControl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, RecordingError>;
