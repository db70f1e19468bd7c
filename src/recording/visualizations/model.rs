//! Shared level and spectrum state read by the renderer.
//!
//! The tap writes the level, the analyzer writes the bands, and a renderer
//! copies snapshots at its own pace. Bands are double-buffered: the writer
//! fills the back buffer and then publishes it by bumping a generation
//! counter whose low bit selects the front buffer. No lock is shared
//! between the three contexts.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::recording::error::{RecordingError, Result};

/// Clamps to [0, 1], mapping NaN to 0. Every value stored in the model passes through here.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Level meter value plus per-band magnitudes, each in [0, 1].
#[derive(Debug)]
pub struct LevelSpectrumModel {
    level: AtomicU32,
    samples_seen: AtomicU64,
    bands: [Box<[AtomicU32]>; 2],
    generation: AtomicUsize,
}

impl LevelSpectrumModel {
    /// Creates a model with a fixed number of bands.
    ///
    /// # Errors
    /// - If `band_count` is zero
    pub fn new(band_count: usize) -> Result<Self> {
        if band_count == 0 {
            return Err(RecordingError::InvalidConfig(
                "band count must be greater than zero".to_string(),
            ));
        }
        let buffer = || -> Box<[AtomicU32]> { (0..band_count).map(|_| AtomicU32::new(0)).collect() };
        Ok(Self {
            level: AtomicU32::new(0f32.to_bits()),
            samples_seen: AtomicU64::new(0),
            bands: [buffer(), buffer()],
            generation: AtomicUsize::new(0),
        })
    }

    pub fn band_count(&self) -> usize {
        self.bands[0].len()
    }

    /// Publishes the instantaneous level.
    pub fn update_level(&self, value: f32) {
        self.level
            .store(clamp_unit(value).to_bits(), Ordering::Release);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Acquire))
    }

    /// Adds to the diagnostic count of samples seen by the tap.
    pub fn add_samples(&self, count: usize) {
        if count > 0 {
            self.samples_seen.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.samples_seen.load(Ordering::Relaxed)
    }

    /// Writes a complete band array into the back buffer and makes it the front.
    ///
    /// Extra input values are ignored and missing ones are zero-filled.
    /// Single writer only.
    pub fn update_bands(&self, values: &[f32]) {
        let generation = self.generation.load(Ordering::Relaxed);
        // Orders the previous publish before any store into the buffer a
        // reader may still be copying.
        fence(Ordering::Release);

        let back = &self.bands[generation.wrapping_add(1) & 1];
        for (index, slot) in back.iter().enumerate() {
            let value = values.get(index).copied().map_or(0.0, clamp_unit);
            slot.store(value.to_bits(), Ordering::Relaxed);
        }

        self.generation
            .store(generation.wrapping_add(1), Ordering::Release);
    }

    /// Copies the front bands into `destination` and returns the current level.
    ///
    /// Slots beyond the band count are zeroed. Never blocks the writers; a
    /// copy that overlapped a publish is discarded and retried.
    pub fn copy_snapshot(&self, destination: &mut [f32]) -> f32 {
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            self.copy_front(generation, destination);
            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == generation {
                break;
            }
            std::hint::spin_loop();
        }

        for slot in destination.iter_mut().skip(self.band_count()) {
            *slot = 0.0;
        }
        self.level()
    }

    fn copy_front(&self, generation: usize, destination: &mut [f32]) {
        let front = &self.bands[generation & 1];
        for (slot, value) in destination.iter_mut().zip(front.iter()) {
            *slot = f32::from_bits(value.load(Ordering::Relaxed));
        }
    }
}
