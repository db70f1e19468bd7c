//! Frequency spectrum analysis for the live visualization.
//!
//! [`SpectrumAnalyzer`] turns one FFT-sized block of samples into smoothed,
//! log-spaced band levels. [`SpectrumWorker`] runs it in the background,
//! draining the ring buffer at a fixed cadence and publishing to the model.

use rustfft::num_complex::Complex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::fft::fft_in_place;
use super::model::{clamp_unit, LevelSpectrumModel};
use super::options::VisualizerOptions;
use super::ring_buffer::RingConsumer;
use crate::recording::error::{RecordingError, Result};

/// Lowest frequency covered by the first band.
pub const MIN_BAND_FREQUENCY_HZ: f32 = 80.0;

/// Level mapped to 0 in the normalized output.
const FLOOR_DB: f32 = -60.0;

/// Keeps log10 away from zero.
const MAGNITUDE_EPSILON: f32 = 1e-6;

const PCM16_SCALE: f32 = 1.0 / 32768.0;

/// Half-open range of FFT bins aggregated into one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

/// Stateful spectrum analyzer with precomputed window and band layout.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    bands: Vec<BandRange>,
    levels: Vec<f32>,
    smoothed: Vec<f32>,
    attack: f32,
    release: f32,
}

impl SpectrumAnalyzer {
    /// Creates an analyzer for audio at `sample_rate`.
    ///
    /// Bands span 80 Hz up to Nyquist.
    ///
    /// # Errors
    /// - If the FFT size is not a power of two
    /// - If any other option is out of range, or the sample rate is zero
    pub fn new(options: &VisualizerOptions, sample_rate: u32) -> Result<Self> {
        options.validate()?;
        if sample_rate == 0 {
            return Err(RecordingError::InvalidSampleRate);
        }

        let fft_size = options.fft_size;
        let nyquist = sample_rate as f32 / 2.0;
        Ok(Self {
            fft_size,
            window: hann_window(fft_size),
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            bands: build_log_bands(
                options.band_count,
                fft_size,
                sample_rate,
                MIN_BAND_FREQUENCY_HZ,
                nyquist,
            ),
            levels: vec![0.0; options.band_count],
            smoothed: vec![0.0; options.band_count],
            attack: options.attack,
            release: options.release,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn band_ranges(&self) -> &[BandRange] {
        &self.bands
    }

    /// Computes normalized band levels for one block, without smoothing.
    ///
    /// Blocks shorter than the FFT size are zero-padded; longer ones are
    /// truncated.
    pub fn analyze(&mut self, samples: &[i16], destination: &mut [f32]) {
        for (index, (bin, &weight)) in self.spectrum.iter_mut().zip(&self.window).enumerate() {
            let sample = samples.get(index).map_or(0.0, |&s| f32::from(s) * PCM16_SCALE);
            *bin = Complex::new(sample * weight, 0.0);
        }

        fft_in_place(&mut self.spectrum);
        compute_band_levels(&self.spectrum, &self.bands, destination);
    }

    /// Analyzes a block and folds it into the smoothed band levels.
    pub fn process_block(&mut self, samples: &[i16]) -> &[f32] {
        let mut levels = std::mem::take(&mut self.levels);
        self.analyze(samples, &mut levels);
        apply_smoothing(&mut self.smoothed, &levels, self.attack, self.release);
        self.levels = levels;
        &self.smoothed
    }

    pub fn smoothed(&self) -> &[f32] {
        &self.smoothed
    }
}

/// Averages bin magnitudes per band and maps them onto [0, 1] via decibels.
fn compute_band_levels(spectrum: &[Complex<f32>], bands: &[BandRange], destination: &mut [f32]) {
    let bin_count = spectrum.len() / 2;

    for (index, slot) in destination.iter_mut().enumerate() {
        let Some(band) = bands.get(index) else {
            *slot = 0.0;
            continue;
        };

        // Bin 0 is DC
        let start = band.start.max(1);
        let end = band.end.min(bin_count);
        let average = if end > start {
            let sum: f32 = spectrum[start..end].iter().map(|bin| bin.norm()).sum();
            sum / (end - start) as f32
        } else {
            0.0
        };

        *slot = normalize_db(average);
    }
}

/// Maps a linear magnitude onto [0, 1] between the -60 dB floor and 0 dB.
pub fn normalize_db(magnitude: f32) -> f32 {
    let db = 20.0 * (magnitude + MAGNITUDE_EPSILON).log10();
    clamp_unit((db - FLOOR_DB) / -FLOOR_DB)
}

/// Splits `[min_freq, max_freq]` into log-spaced bands and converts them to bin ranges.
///
/// Every band covers at least one bin.
pub fn build_log_bands(
    band_count: usize,
    fft_size: usize,
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
) -> Vec<BandRange> {
    let min = min_freq.max(1.0);
    let max = max_freq.max(min + 1.0);
    let log_min = min.log10();
    let log_max = max.log10();
    let bin_width = sample_rate as f32 / fft_size as f32;

    (0..band_count)
        .map(|band| {
            let t0 = band as f32 / band_count as f32;
            let t1 = (band + 1) as f32 / band_count as f32;
            let f0 = 10f32.powf(log_min + (log_max - log_min) * t0);
            let f1 = 10f32.powf(log_min + (log_max - log_min) * t1);
            let start = (f0 / bin_width).round() as usize;
            let end = ((f1 / bin_width).round() as usize).max(start + 1);
            BandRange { start, end }
        })
        .collect()
}

/// Symmetric Hann window over `len` samples.
fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denominator = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denominator).cos()))
        .collect()
}

/// Moves each band toward its target, rising with `attack` and falling with `release`.
pub fn apply_smoothing(current: &mut [f32], target: &[f32], attack: f32, release: f32) {
    for (value, &goal) in current.iter_mut().zip(target) {
        let factor = if goal >= *value { attack } else { release };
        *value += (goal - *value) * factor;
    }
}

/// Lifecycle of the background analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Background task draining the ring buffer into the model.
pub struct SpectrumWorker {
    state: AnalyzerState,
    pending: Option<(SpectrumAnalyzer, RingConsumer)>,
    model: Arc<LevelSpectrumModel>,
    interval: Duration,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SpectrumWorker {
    pub fn new(
        analyzer: SpectrumAnalyzer,
        consumer: RingConsumer,
        model: Arc<LevelSpectrumModel>,
        interval: Duration,
    ) -> Self {
        Self {
            state: AnalyzerState::Idle,
            pending: Some((analyzer, consumer)),
            model,
            interval,
            shutdown: None,
            task: None,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    /// Spawns the analysis loop on the current tokio runtime.
    ///
    /// Does nothing unless the worker is idle.
    pub fn start(&mut self) {
        if self.state != AnalyzerState::Idle {
            return;
        }
        let Some((analyzer, consumer)) = self.pending.take() else {
            return;
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let model = Arc::clone(&self.model);
        let interval = self.interval;
        self.task = Some(tokio::spawn(run_analyzer(
            analyzer,
            consumer,
            model,
            interval,
            shutdown_rx,
        )));
        self.shutdown = Some(shutdown_tx);
        self.state = AnalyzerState::Running;
        tracing::debug!("Spectrum analyzer started ({:?} interval)", interval);
    }

    /// Signals the loop to exit and waits for it. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        match self.state {
            AnalyzerState::Stopped => return,
            AnalyzerState::Idle => {
                self.pending = None;
                self.state = AnalyzerState::Stopped;
                return;
            }
            AnalyzerState::Running | AnalyzerState::Stopping => {}
        }

        self.state = AnalyzerState::Stopping;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("Spectrum analyzer task failed: {}", e),
            }
        }
        self.state = AnalyzerState::Stopped;
        tracing::debug!("Spectrum analyzer stopped");
    }
}

impl Drop for SpectrumWorker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_analyzer(
    mut analyzer: SpectrumAnalyzer,
    mut consumer: RingConsumer,
    model: Arc<LevelSpectrumModel>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let fft_size = analyzer.fft_size();
    let mut block = vec![0i16; fft_size];

    loop {
        if consumer.available_to_read() >= fft_size && consumer.read(&mut block) == fft_size {
            model.update_bands(analyzer.process_block(&block));
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
