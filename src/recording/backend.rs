//! Seam between a recording session and the audio hardware.
//!
//! A backend owns the process-wide subsystem lifecycle and opens input
//! streams. The session supplies an [`AudioCallback`] that the backend drives
//! from its real-time thread with mono PCM16 blocks.

use super::error::Result;
use super::format::AudioFormat;

/// What the capture callback asks of the audio subsystem after a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    /// Keep delivering blocks
    Continue,
    /// Finish normally; no further blocks are needed
    Complete,
    /// Abandon the stream
    Abort,
}

/// Consumer of captured audio, invoked on the real-time thread.
///
/// Implementations must not block on anything but a brief, bounded section
/// and must not allocate after warm-up.
pub trait AudioCallback: Send + 'static {
    fn on_audio(&mut self, samples: &[i16]) -> CallbackFlow;
}

/// A running (or ready) hardware input stream.
pub trait CaptureStream: Send {
    /// Starts delivering blocks to the bound callback.
    ///
    /// # Errors
    /// - If the hardware refuses to start the stream
    fn start(&mut self) -> Result<()>;

    /// Stops delivering blocks. Dropping the stream releases it.
    ///
    /// # Errors
    /// - If the hardware reports a failure while stopping
    fn stop(&mut self) -> Result<()>;
}

/// Audio subsystem able to open input streams.
pub trait CaptureBackend: Send + Sync {
    /// Registers a session with the process-wide subsystem, initializing it on
    /// first use.
    ///
    /// # Errors
    /// - If subsystem initialization fails
    fn acquire(&self) -> Result<()>;

    /// Balances a successful [`CaptureBackend::acquire`].
    fn release(&self);

    /// Resolves the configured input device and opens a stream delivering
    /// `format` blocks to `callback`. The stream is not started.
    ///
    /// # Errors
    /// - If no suitable input device exists
    /// - If the stream cannot be built
    fn open_input(
        &self,
        format: &AudioFormat,
        frames_per_buffer: u32,
        callback: Box<dyn AudioCallback>,
    ) -> Result<Box<dyn CaptureStream>>;
}
