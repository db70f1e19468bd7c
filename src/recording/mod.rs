//! Audio capture core.
//!
//! A [`Recorder`] opens an input stream, writes PCM16 to a WAV file with
//! frame-accurate limits, and feeds an optional [`AudioTap`] for live
//! visualization. Every session ends in exactly one [`AudioRecordingResult`].

pub mod backend;
pub mod cpal_backend;
pub mod error;
pub mod format;
pub mod output;
pub mod session;
pub mod subsystem;
pub mod visualizations;

pub use backend::{AudioCallback, CallbackFlow, CaptureBackend, CaptureStream};
pub use cpal_backend::CpalBackend;
pub use error::{RecordingError, Result};
pub use format::{AudioFormat, AudioRecordingResult, CaptureLimits};
pub use session::{Recorder, RecordingOptions, RecordingSession, SessionState};
pub use visualizations::{AudioTap, LevelSpectrumModel, LevelTap, Visualizer, VisualizerOptions};
