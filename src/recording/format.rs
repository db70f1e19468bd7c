//! Audio format, capture limits, and the recording outcome.

use std::path::PathBuf;
use std::time::Duration;

use super::error::{RecordingError, Result};

/// Bytes per sample for 16-bit signed PCM.
pub const PCM16_BYTES: u16 = 2;

/// PCM16 audio format of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// Channel count (only 1 is accepted by the recorder)
    pub channels: u16,
}

impl AudioFormat {
    /// Creates a mono PCM16 format at the given sample rate.
    pub fn mono(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels: 1,
        }
    }

    /// Size of one frame (one sample per channel) in bytes.
    pub fn bytes_per_frame(&self) -> u64 {
        u64::from(self.channels) * u64::from(PCM16_BYTES)
    }

    /// Checks that the format can be recorded.
    ///
    /// # Errors
    /// - If the format is not mono
    /// - If the sample rate is zero
    pub fn validate(&self) -> Result<()> {
        if self.channels != 1 {
            return Err(RecordingError::UnsupportedChannels(self.channels));
        }
        if self.sample_rate_hz == 0 {
            return Err(RecordingError::InvalidSampleRate);
        }
        Ok(())
    }

    /// Duration covered by `frames` frames at this sample rate.
    pub fn duration_of(&self, frames: u64) -> Duration {
        if self.sample_rate_hz == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate_hz))
    }

    pub(crate) fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Upper bounds on a capture session, in frames.
///
/// `None` means unbounded. The session only ever consults `max_frames`; the
/// byte bound is folded into it by [`CaptureLimits::calculate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureLimits {
    pub max_frames: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl CaptureLimits {
    /// No limit at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Derives frame limits from a maximum duration and a maximum PCM byte count.
    ///
    /// A zero duration or zero byte count leaves that dimension unbounded. When
    /// both are set the tighter one wins.
    pub fn calculate(format: &AudioFormat, max_duration: Duration, max_bytes: u64) -> Self {
        let frames_by_duration = if max_duration.is_zero() {
            None
        } else {
            Some((max_duration.as_secs_f64() * f64::from(format.sample_rate_hz)).floor() as u64)
        };

        let bytes_per_frame = format.bytes_per_frame().max(1);
        let frames_by_bytes = (max_bytes > 0).then(|| max_bytes / bytes_per_frame);

        let max_frames = match (frames_by_duration, frames_by_bytes) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            max_frames,
            max_bytes: max_frames.map(|frames| frames * bytes_per_frame),
        }
    }

    /// Frames that may still be written after `frames_written`.
    pub fn remaining(&self, frames_written: u64) -> Option<u64> {
        self.max_frames
            .map(|max| max.saturating_sub(frames_written))
    }
}

/// Terminal outcome of a recording session, produced exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecordingResult {
    /// Recorded files; empty when the session was canceled
    pub paths: Vec<PathBuf>,
    /// Recorded duration derived from the frame count
    pub duration: Duration,
    pub format: AudioFormat,
    /// PCM payload bytes written (header excluded)
    pub bytes: u64,
    pub canceled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_stereo() {
        let format = AudioFormat {
            sample_rate_hz: 16000,
            channels: 2,
        };
        assert!(matches!(
            format.validate(),
            Err(RecordingError::UnsupportedChannels(2))
        ));
        assert!(AudioFormat::mono(16000).validate().is_ok());
        assert!(matches!(
            AudioFormat::mono(0).validate(),
            Err(RecordingError::InvalidSampleRate)
        ));
    }

    #[test]
    fn test_limits_tighter_bound_wins() {
        let format = AudioFormat::mono(16000);

        let by_duration = CaptureLimits::calculate(&format, Duration::from_secs(2), 1_000_000);
        assert_eq!(by_duration.max_frames, Some(32000));
        assert_eq!(by_duration.max_bytes, Some(64000));

        let by_bytes = CaptureLimits::calculate(&format, Duration::from_secs(60), 1001);
        assert_eq!(by_bytes.max_frames, Some(500));
        assert_eq!(by_bytes.max_bytes, Some(1000));
    }

    #[test]
    fn test_limits_zero_means_unbounded() {
        let format = AudioFormat::mono(8000);
        assert_eq!(
            CaptureLimits::calculate(&format, Duration::ZERO, 0),
            CaptureLimits::unbounded()
        );

        let only_duration = CaptureLimits::calculate(&format, Duration::from_millis(500), 0);
        assert_eq!(only_duration.max_frames, Some(4000));
        assert_eq!(only_duration.remaining(3000), Some(1000));
        assert_eq!(only_duration.remaining(5000), Some(0));
        assert_eq!(CaptureLimits::unbounded().remaining(5000), None);
    }

    #[test]
    fn test_duration_of_frames() {
        let format = AudioFormat::mono(16000);
        assert_eq!(format.duration_of(8000), Duration::from_millis(500));
        assert_eq!(format.bytes_per_frame(), 2);
    }
}
