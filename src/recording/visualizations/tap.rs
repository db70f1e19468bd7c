//! Per-callback level metering and sample forwarding.

use std::sync::Arc;

use super::model::LevelSpectrumModel;
use super::ring_buffer::RingProducer;

const PCM16_SCALE: f32 = 1.0 / 32768.0;

/// Receives every captured PCM16 block on the real-time thread.
///
/// Implementations must be O(n) and must not allocate, block, or do I/O.
pub trait AudioTap: Send {
    fn push_pcm16(&mut self, samples: &[i16]);
}

/// Updates the level meter and feeds the spectrum ring buffer.
pub struct LevelTap {
    model: Arc<LevelSpectrumModel>,
    ring: Option<RingProducer>,
    level_boost: f32,
}

impl LevelTap {
    /// Creates a tap publishing into `model`. Without a ring the tap only meters.
    pub fn new(model: Arc<LevelSpectrumModel>, level_boost: f32, ring: Option<RingProducer>) -> Self {
        Self {
            model,
            ring,
            level_boost,
        }
    }
}

impl AudioTap for LevelTap {
    fn push_pcm16(&mut self, samples: &[i16]) {
        if samples.is_empty() {
            self.model.update_level(0.0);
            return;
        }

        self.model.add_samples(samples.len());
        self.model.update_level(rms(samples) * self.level_boost);

        // A full ring drops this block from the spectrum only
        if let Some(ring) = self.ring.as_mut() {
            ring.write(samples);
        }
    }
}

/// Root-mean-square of normalized PCM16 samples.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let value = f64::from(f32::from(s) * PCM16_SCALE);
            value * value
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}
