//! Live level and spectrum visualization.
//!
//! Data flows one way: the capture callback pushes PCM through a [`LevelTap`],
//! which meters the block and forwards it into a ring buffer. A
//! [`SpectrumWorker`] drains the ring at a fixed rate and publishes band
//! levels. Renderers copy snapshots out of the [`LevelSpectrumModel`].

pub mod fft;
pub mod model;
pub mod options;
pub mod ring_buffer;
pub mod spectrum;
pub mod tap;

use std::sync::Arc;

pub use model::LevelSpectrumModel;
pub use options::VisualizerOptions;
pub use ring_buffer::{sample_ring, RingConsumer, RingProducer};
pub use spectrum::{AnalyzerState, SpectrumAnalyzer, SpectrumWorker};
pub use tap::{AudioTap, LevelTap};

use crate::recording::error::Result;

/// Ring capacity in FFT blocks. Leaves room for the worker to fall behind.
const RING_BLOCKS: usize = 8;

/// Model plus the optional background analyzer for one recording.
pub struct Visualizer {
    model: Arc<LevelSpectrumModel>,
    worker: Option<SpectrumWorker>,
}

impl Visualizer {
    /// Builds the model, the tap to hand to the session, and the analyzer.
    ///
    /// With the spectrum disabled the tap only meters and no worker exists.
    ///
    /// # Errors
    /// - If the options fail validation or the sample rate is zero
    pub fn new(options: &VisualizerOptions, sample_rate: u32) -> Result<(Self, LevelTap)> {
        options.validate()?;
        let model = Arc::new(LevelSpectrumModel::new(options.band_count)?);

        if !options.spectrum_enabled {
            let tap = LevelTap::new(Arc::clone(&model), options.level_boost, None);
            return Ok((Self { model, worker: None }, tap));
        }

        let analyzer = SpectrumAnalyzer::new(options, sample_rate)?;
        let (producer, consumer) = sample_ring(options.fft_size * RING_BLOCKS)?;
        let worker = SpectrumWorker::new(
            analyzer,
            consumer,
            Arc::clone(&model),
            options.update_interval(),
        );
        let tap = LevelTap::new(Arc::clone(&model), options.level_boost, Some(producer));

        Ok((
            Self {
                model,
                worker: Some(worker),
            },
            tap,
        ))
    }

    pub fn model(&self) -> Arc<LevelSpectrumModel> {
        Arc::clone(&self.model)
    }

    /// Starts the analyzer. Requires a tokio runtime.
    pub fn start(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.start();
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.shutdown().await;
        }
    }

    pub fn analyzer_state(&self) -> Option<AnalyzerState> {
        self.worker.as_ref().map(SpectrumWorker::state)
    }
}
