//! Recording session lifecycle.
//!
//! A session moves through `Starting -> Recording -> (Stopping | Canceling) ->
//! Finalized`. Transitions out of `Recording` are compare-and-swap, so the
//! first of stop, cancel, dispose, or the capture limit decides the outcome and
//! every later call just returns the same result.
//!
//! The capture callback and finalization share a single mutex guarding the
//! writer and the frame counter. Finalization holds it only long enough to
//! take the writer out; closing the file and publishing the result happen
//! under a separate one-shot lock the audio thread never touches.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};

use super::backend::{AudioCallback, CallbackFlow, CaptureBackend, CaptureStream};
use super::cpal_backend::CpalBackend;
use super::error::{RecordingError, Result};
use super::format::{AudioFormat, AudioRecordingResult, CaptureLimits};
use super::output::{create_writer, remove_quietly, PcmWriter};
use super::visualizations::AudioTap;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Starting = 0,
    Recording = 1,
    Stopping = 2,
    Canceling = 3,
    Finalized = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Recording,
            2 => Self::Stopping,
            3 => Self::Canceling,
            _ => Self::Finalized,
        }
    }
}

/// Everything a caller chooses before a recording starts.
pub struct RecordingOptions {
    pub format: AudioFormat,
    /// Zero means no duration limit
    pub max_duration: Duration,
    /// Zero means no size limit
    pub max_bytes: u64,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub frames_per_buffer: u32,
    /// Receives every accepted block on the audio thread
    pub tap: Option<Box<dyn AudioTap>>,
}

impl RecordingOptions {
    /// Unlimited recording into `output_dir` with default naming.
    pub fn new(format: AudioFormat, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            max_duration: Duration::ZERO,
            max_bytes: 0,
            output_dir: output_dir.into(),
            file_prefix: "voice".to_string(),
            frames_per_buffer: 1024,
            tap: None,
        }
    }

    pub fn with_limits(mut self, max_duration: Duration, max_bytes: u64) -> Self {
        self.max_duration = max_duration;
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_tap(mut self, tap: impl AudioTap + 'static) -> Self {
        self.tap = Some(Box::new(tap));
        self
    }
}

/// Starts recording sessions on a capture backend.
pub struct Recorder {
    backend: Arc<dyn CaptureBackend>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Recorder {
    /// Records from a cpal input device ("default", a name, or an index).
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_backend(Arc::new(CpalBackend::new(device)))
    }

    pub fn with_backend(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Starts a session that runs until stopped, canceled, dropped, or limited.
    ///
    /// # Errors
    /// See [`Recorder::start_until`].
    pub async fn start(&self, options: RecordingOptions) -> Result<RecordingSession> {
        self.start_until(options, std::future::pending::<()>()).await
    }

    /// Starts a session that is canceled when `cancel` resolves.
    ///
    /// Must be called within a tokio runtime. No hardware resource stays
    /// acquired when this returns an error.
    ///
    /// # Errors
    /// - If the format is not mono or has a zero sample rate
    /// - If the audio subsystem cannot be initialized
    /// - If the output file cannot be created
    /// - If the input device cannot be opened or started
    pub async fn start_until<F>(
        &self,
        options: RecordingOptions,
        cancel: F,
    ) -> Result<RecordingSession>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let RecordingOptions {
            format,
            max_duration,
            max_bytes,
            output_dir,
            file_prefix,
            frames_per_buffer,
            tap,
        } = options;

        format.validate()?;
        let limits = CaptureLimits::calculate(&format, max_duration, max_bytes);

        // Device enumeration and stream setup block, keep them off the runtime
        let backend = Arc::clone(&self.backend);
        let core = tokio::task::spawn_blocking(move || {
            open_session(
                backend,
                format,
                limits,
                &output_dir,
                &file_prefix,
                frames_per_buffer,
                tap,
            )
        })
        .await
        .map_err(|e| RecordingError::StreamBuild(format!("stream setup task failed: {e}")))??;

        tracing::info!(
            "Recording started: {} ({} Hz, limit {})",
            core.output_path.display(),
            format.sample_rate_hz,
            limits
                .max_frames
                .map_or_else(|| "none".to_string(), |frames| format!("{frames} frames")),
        );

        tokio::spawn(supervise(Arc::clone(&core), cancel));

        Ok(RecordingSession { core })
    }
}

/// Acquires the subsystem, creates the output file, and starts the stream.
///
/// Everything acquired is released again if a later step fails.
fn open_session(
    backend: Arc<dyn CaptureBackend>,
    format: AudioFormat,
    limits: CaptureLimits,
    output_dir: &Path,
    file_prefix: &str,
    frames_per_buffer: u32,
    tap: Option<Box<dyn AudioTap>>,
) -> Result<Arc<SessionCore>> {
    backend.acquire()?;

    let (output_path, writer) = match create_writer(output_dir, file_prefix, &format) {
        Ok(created) => created,
        Err(e) => {
            backend.release();
            return Err(e);
        }
    };

    let core = Arc::new(SessionCore::new(format, limits, output_path, writer, backend));
    let callback = CaptureCallback {
        core: Arc::clone(&core),
        tap,
    };
    if let Err(e) = core.open_and_start(frames_per_buffer, Box::new(callback)) {
        core.discard();
        return Err(e);
    }
    Ok(core)
}

/// Finishes the session once the capture limit is hit or the cancel future resolves.
async fn supervise<F>(core: Arc<SessionCore>, cancel: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::select! {
        _ = core.wake.notified() => {
            // Also fires after an explicit finalize, in which case this is a no-op
            core.stop();
        }
        _ = cancel => {
            tracing::debug!("Recording cancellation requested");
            core.cancel();
        }
    }
}

/// Handle to a live recording. Dropping it disposes the session.
pub struct RecordingSession {
    core: Arc<SessionCore>,
}

impl RecordingSession {
    /// Stops capture and keeps the file.
    pub fn stop(&self) -> AudioRecordingResult {
        self.core.stop()
    }

    /// Stops capture and deletes the file.
    pub fn cancel(&self) -> AudioRecordingResult {
        self.core.cancel()
    }

    /// Stops capture unless something already ended the session.
    pub fn dispose(&self) -> AudioRecordingResult {
        self.core.dispose()
    }

    /// Waits for the session's single result, however it ends.
    pub async fn completion(&self) -> AudioRecordingResult {
        let mut receiver = self.core.completion.subscribe();
        if let Ok(value) = receiver.wait_for(Option::is_some).await {
            if let Some(result) = value.as_ref() {
                return result.clone();
            }
        }
        // The sender lives in the core, so this is unreachable in practice
        self.core.dispose()
    }

    /// The result if the session has already finalized.
    pub fn try_result(&self) -> Option<AudioRecordingResult> {
        self.core.completion.borrow().clone()
    }

    pub fn output_path(&self) -> &Path {
        &self.core.output_path
    }

    pub fn format(&self) -> AudioFormat {
        self.core.format
    }

    pub fn limits(&self) -> CaptureLimits {
        self.core.limits
    }

    pub fn frames_written(&self) -> u64 {
        self.core.lock_gate().frames_written
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.core.dispose();
    }
}

/// State touched by both the audio thread and finalization.
struct Gate {
    writer: Option<PcmWriter>,
    frames_written: u64,
    write_error: Option<hound::Error>,
}

struct SessionCore {
    format: AudioFormat,
    limits: CaptureLimits,
    output_path: PathBuf,
    backend: Arc<dyn CaptureBackend>,
    state: AtomicU8,
    stop_requested: AtomicBool,
    cancel_requested: AtomicBool,
    stream_released: AtomicBool,
    stream: Mutex<Option<Box<dyn CaptureStream>>>,
    gate: Mutex<Gate>,
    finalized: Mutex<Option<AudioRecordingResult>>,
    completion: watch::Sender<Option<AudioRecordingResult>>,
    wake: Notify,
}

impl SessionCore {
    fn new(
        format: AudioFormat,
        limits: CaptureLimits,
        output_path: PathBuf,
        writer: PcmWriter,
        backend: Arc<dyn CaptureBackend>,
    ) -> Self {
        let (completion, _) = watch::channel(None);
        Self {
            format,
            limits,
            output_path,
            backend,
            state: AtomicU8::new(SessionState::Starting as u8),
            stop_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            stream_released: AtomicBool::new(false),
            stream: Mutex::new(None),
            gate: Mutex::new(Gate {
                writer: Some(writer),
                frames_written: 0,
                write_error: None,
            }),
            finalized: Mutex::new(None),
            completion,
            wake: Notify::new(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_and_start(&self, frames_per_buffer: u32, callback: Box<dyn AudioCallback>) -> Result<()> {
        let mut stream = self
            .backend
            .open_input(&self.format, frames_per_buffer, callback)?;
        stream.start()?;
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);

        self.transition(SessionState::Starting, SessionState::Recording);
        Ok(())
    }

    /// Tears down a session that failed to start. Nothing is published to callers.
    fn discard(&self) {
        self.state
            .store(SessionState::Canceling as u8, Ordering::Release);
        self.cancel_requested.store(true, Ordering::Release);
        self.release_stream();
        self.finalize();
    }

    fn stop(&self) -> AudioRecordingResult {
        if self.transition(SessionState::Recording, SessionState::Stopping) {
            self.stop_requested.store(true, Ordering::Release);
            tracing::debug!("Recording stopping");
        }
        self.release_stream();
        self.finalize()
    }

    fn cancel(&self) -> AudioRecordingResult {
        if self.transition(SessionState::Recording, SessionState::Canceling) {
            self.cancel_requested.store(true, Ordering::Release);
            tracing::debug!("Recording canceling");
        }
        self.release_stream();
        self.finalize()
    }

    fn dispose(&self) -> AudioRecordingResult {
        self.stop()
    }

    /// Stops and drops the hardware stream and balances the subsystem acquire.
    /// Runs at most once.
    fn release_stream(&self) {
        if self.stream_released.swap(true, Ordering::AcqRel) {
            return;
        }

        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.stop() {
                tracing::debug!("Ignoring stream stop failure: {}", e);
            }
        }
        self.backend.release();
    }

    /// Closes the writer and publishes the result. Later calls return the stored result.
    fn finalize(&self) -> AudioRecordingResult {
        let mut finalized = self
            .finalized
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = finalized.as_ref() {
            return result.clone();
        }

        let canceled = self.state() == SessionState::Canceling;
        let (writer, frames, write_error) = {
            let mut gate = self.lock_gate();
            (gate.writer.take(), gate.frames_written, gate.write_error.take())
        };

        if let Some(writer) = writer {
            if let Err(e) = writer.finalize() {
                tracing::warn!("Failed to finalize {}: {}", self.output_path.display(), e);
            }
        }
        if let Some(e) = write_error {
            tracing::warn!("Recording write failed after {} frames: {}", frames, e);
        }
        if canceled {
            remove_quietly(&self.output_path);
        }

        let result = AudioRecordingResult {
            paths: if canceled {
                Vec::new()
            } else {
                vec![self.output_path.clone()]
            },
            duration: self.format.duration_of(frames),
            format: self.format,
            bytes: frames * self.format.bytes_per_frame(),
            canceled,
        };
        *finalized = Some(result.clone());
        self.state
            .store(SessionState::Finalized as u8, Ordering::Release);
        self.completion.send_replace(Some(result.clone()));
        drop(finalized);

        self.wake.notify_one();
        tracing::info!(
            "Recording finalized: {} frames, {:.2}s{}",
            frames,
            result.duration.as_secs_f64(),
            if canceled { " (canceled)" } else { "" }
        );
        result
    }

    /// Appends as much of `samples` as the budget allows and returns the accepted sample count.
    fn append(&self, samples: &[i16]) -> usize {
        let channels = usize::from(self.format.channels.max(1));
        let mut limit_reached = false;
        let mut write_failed = false;

        let accepted = {
            let mut guard = self.lock_gate();
            let Gate {
                writer,
                frames_written,
                write_error,
                ..
            } = &mut *guard;
            let Some(writer) = writer.as_mut() else {
                return 0;
            };

            let block_frames = samples.len() / channels;
            let accepted_frames = match self.limits.remaining(*frames_written) {
                Some(remaining) => {
                    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
                    limit_reached = block_frames >= remaining;
                    block_frames.min(remaining)
                }
                None => block_frames,
            };

            let accepted = accepted_frames * channels;
            let mut written = 0;
            for &sample in &samples[..accepted] {
                if let Err(e) = writer.write_sample(sample) {
                    *write_error = Some(e);
                    write_failed = true;
                    break;
                }
                written += 1;
            }
            *frames_written += (written / channels) as u64;
            written
        };

        if !(limit_reached || write_failed) {
            return accepted;
        }

        // Ends with stop semantics; a later cancel cannot delete the file
        if !self.transition(SessionState::Recording, SessionState::Stopping) {
            self.transition(SessionState::Starting, SessionState::Stopping);
        }
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            if write_failed {
                tracing::warn!("Recording write failed, stopping");
            } else {
                tracing::info!("Capture limit reached");
            }
            self.wake.notify_one();
        }
        accepted
    }

    fn flow(&self) -> CallbackFlow {
        if self.cancel_requested.load(Ordering::Acquire) {
            CallbackFlow::Abort
        } else if self.stop_requested.load(Ordering::Acquire) {
            CallbackFlow::Complete
        } else {
            CallbackFlow::Continue
        }
    }
}

/// Bound to the hardware stream; runs on the audio thread.
struct CaptureCallback {
    core: Arc<SessionCore>,
    tap: Option<Box<dyn AudioTap>>,
}

impl AudioCallback for CaptureCallback {
    fn on_audio(&mut self, samples: &[i16]) -> CallbackFlow {
        let flow = self.core.flow();
        if flow != CallbackFlow::Continue || samples.is_empty() {
            return flow;
        }

        let accepted = self.core.append(samples);
        if accepted > 0 {
            if let Some(tap) = self.tap.as_mut() {
                tap.push_pcm16(&samples[..accepted]);
            }
        }
        self.core.flow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type CallbackSlot = Arc<Mutex<Option<Box<dyn AudioCallback>>>>;

    #[derive(Default)]
    struct FakeBackend {
        slot: CallbackSlot,
        acquired: AtomicUsize,
        released: AtomicUsize,
        fail_open: bool,
    }

    impl FakeBackend {
        fn failing() -> Self {
            Self {
                fail_open: true,
                ..Self::default()
            }
        }

        /// Delivers a block the way the hardware thread would.
        fn feed(&self, samples: &[i16]) -> Option<CallbackFlow> {
            let mut slot = self.slot.lock().unwrap();
            slot.as_mut().map(|callback| callback.on_audio(samples))
        }
    }

    impl CaptureBackend for FakeBackend {
        fn acquire(&self) -> Result<()> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn open_input(
            &self,
            _format: &AudioFormat,
            _frames_per_buffer: u32,
            callback: Box<dyn AudioCallback>,
        ) -> Result<Box<dyn CaptureStream>> {
            if self.fail_open {
                return Err(RecordingError::NoInputDevice);
            }
            *self.slot.lock().unwrap() = Some(callback);
            Ok(Box::new(FakeStream {
                slot: Arc::clone(&self.slot),
            }))
        }
    }

    struct FakeStream {
        slot: CallbackSlot,
    }

    impl CaptureStream for FakeStream {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            Err(RecordingError::StreamControl("already stopped".into()))
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.slot.lock().unwrap().take();
        }
    }

    struct CountingTap(Arc<AtomicUsize>);

    impl AudioTap for CountingTap {
        fn push_pcm16(&mut self, samples: &[i16]) {
            self.0.fetch_add(samples.len(), Ordering::SeqCst);
        }
    }

    fn ramp(start: i16, len: usize) -> Vec<i16> {
        (0..len).map(|i| start + i as i16).collect()
    }

    fn read_wav(path: &Path) -> Vec<i16> {
        hound::WavReader::open(path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_budget_truncates_to_exact_frames() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let tapped = Arc::new(AtomicUsize::new(0));

        let options = RecordingOptions::new(AudioFormat::mono(16000), dir.path())
            .with_limits(Duration::ZERO, 2000)
            .with_tap(CountingTap(Arc::clone(&tapped)));
        let session = recorder.start(options).await.unwrap();
        assert_eq!(session.limits().max_frames, Some(1000));
        assert_eq!(session.state(), SessionState::Recording);

        assert_eq!(backend.feed(&ramp(0, 300)), Some(CallbackFlow::Continue));
        assert_eq!(backend.feed(&ramp(300, 300)), Some(CallbackFlow::Continue));
        assert_eq!(backend.feed(&ramp(600, 300)), Some(CallbackFlow::Continue));
        assert_eq!(backend.feed(&ramp(900, 300)), Some(CallbackFlow::Complete));

        let result = session.completion().await;
        assert!(!result.canceled);
        assert_eq!(result.bytes, 2000);
        assert_eq!(result.duration, Duration::from_millis(62) + Duration::from_micros(500));
        assert_eq!(result.paths, vec![session.output_path().to_path_buf()]);
        assert_eq!(tapped.load(Ordering::SeqCst), 1000);

        assert_eq!(read_wav(&result.paths[0]), ramp(0, 1000));
        assert_eq!(session.state(), SessionState::Finalized);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_terminal_call_wins() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let session = recorder
            .start(RecordingOptions::new(AudioFormat::mono(8000), dir.path()))
            .await
            .unwrap();

        backend.feed(&[100; 160]);
        let stopped = session.stop();
        let canceled = session.cancel();
        let disposed = session.dispose();

        assert!(!stopped.canceled);
        assert_eq!(stopped.bytes, 320);
        assert_eq!(canceled, stopped);
        assert_eq!(disposed, stopped);
        assert_eq!(session.completion().await, stopped);
        assert_eq!(session.try_result(), Some(stopped.clone()));
        assert!(stopped.paths[0].exists());

        // The stream is gone after teardown
        assert_eq!(backend.feed(&[1; 16]), None);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let session = recorder
            .start(RecordingOptions::new(AudioFormat::mono(16000), dir.path()))
            .await
            .unwrap();
        let path = session.output_path().to_path_buf();
        assert!(path.exists());

        backend.feed(&ramp(0, 480));
        let result = session.cancel();

        assert!(result.canceled);
        assert!(result.paths.is_empty());
        assert_eq!(result.bytes, 960);
        assert!(!path.exists());
        assert_eq!(session.stop(), result);
    }

    #[tokio::test]
    async fn test_stereo_rejected_before_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let format = AudioFormat {
            sample_rate_hz: 16000,
            channels: 2,
        };

        let result = recorder
            .start(RecordingOptions::new(format, dir.path()))
            .await;
        assert!(matches!(result, Err(RecordingError::UnsupportedChannels(2))));
        assert_eq!(backend.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::failing());
        let recorder = Recorder::with_backend(backend.clone());

        let result = recorder
            .start(RecordingOptions::new(AudioFormat::mono(16000), dir.path()))
            .await;
        assert!(matches!(result, Err(RecordingError::NoInputDevice)));
        assert_eq!(backend.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_disposes_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let session = recorder
            .start(RecordingOptions::new(AudioFormat::mono(16000), dir.path()))
            .await
            .unwrap();
        let path = session.output_path().to_path_buf();

        backend.feed(&ramp(10, 64));
        assert_eq!(session.frames_written(), 64);
        drop(session);

        assert_eq!(backend.released.load(Ordering::SeqCst), 1);
        assert_eq!(read_wav(&path), ramp(10, 64));
    }

    #[tokio::test]
    async fn test_cancel_future_cancels_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();

        let session = recorder
            .start_until(
                RecordingOptions::new(AudioFormat::mono(16000), dir.path()),
                async move {
                    let _ = cancel_rx.await;
                },
            )
            .await
            .unwrap();
        let path = session.output_path().to_path_buf();

        backend.feed(&[5; 32]);
        cancel_tx.send(()).unwrap();

        let result = session.completion().await;
        assert!(result.canceled);
        assert!(result.paths.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_blocks_after_limit_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let options = RecordingOptions::new(AudioFormat::mono(1000), dir.path())
            .with_limits(Duration::from_millis(100), 0);
        let session = recorder.start(options).await.unwrap();

        // Exactly filling the budget also completes
        assert_eq!(backend.feed(&[7; 100]), Some(CallbackFlow::Complete));
        assert_eq!(backend.feed(&[8; 50]), Some(CallbackFlow::Complete));
        assert_eq!(session.frames_written(), 100);

        let result = session.completion().await;
        assert_eq!(result.bytes, 200);
        assert_eq!(read_wav(&result.paths[0]), vec![7; 100]);
    }

    #[tokio::test]
    async fn test_limit_then_cancel_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let options = RecordingOptions::new(AudioFormat::mono(1000), dir.path())
            .with_limits(Duration::ZERO, 200);
        let session = recorder.start(options).await.unwrap();

        assert_eq!(backend.feed(&ramp(0, 150)), Some(CallbackFlow::Complete));
        assert_eq!(session.state(), SessionState::Stopping);

        let result = session.cancel();
        assert!(!result.canceled);
        assert_eq!(result.bytes, 200);
        assert!(result.paths[0].exists());
        assert_eq!(read_wav(&result.paths[0]), ramp(0, 100));
        assert_eq!(session.completion().await, result);
    }

    #[tokio::test]
    async fn test_concurrent_terminal_calls_agree() {
        for _ in 0..16 {
            let dir = tempfile::tempdir().unwrap();
            let backend = Arc::new(FakeBackend::default());
            let recorder = Recorder::with_backend(backend.clone());
            let session = recorder
                .start(RecordingOptions::new(AudioFormat::mono(8000), dir.path()))
                .await
                .unwrap();
            let path = session.output_path().to_path_buf();
            backend.feed(&[42; 80]);

            let barrier = std::sync::Barrier::new(3);
            let results: Vec<AudioRecordingResult> = std::thread::scope(|scope| {
                let handles = [
                    scope.spawn(|| {
                        barrier.wait();
                        session.stop()
                    }),
                    scope.spawn(|| {
                        barrier.wait();
                        session.cancel()
                    }),
                    scope.spawn(|| {
                        barrier.wait();
                        session.dispose()
                    }),
                ];
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert!(results.iter().all(|result| *result == results[0]));
            assert_eq!(results[0].bytes, 160);
            assert_eq!(path.exists(), !results[0].canceled);
            assert_eq!(backend.released.load(Ordering::SeqCst), 1);
            assert_eq!(session.state(), SessionState::Finalized);
        }
    }

    #[tokio::test]
    async fn test_stop_while_feeding_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let recorder = Recorder::with_backend(backend.clone());
        let session = recorder
            .start(RecordingOptions::new(AudioFormat::mono(16000), dir.path()))
            .await
            .unwrap();

        let result = std::thread::scope(|scope| {
            let feeder = scope.spawn(|| {
                while backend.feed(&[3; 64]) == Some(CallbackFlow::Continue) {}
            });
            std::thread::sleep(Duration::from_millis(5));
            let result = session.stop();
            feeder.join().unwrap();
            result
        });

        let samples = read_wav(&result.paths[0]);
        assert_eq!(samples.len() as u64 * 2, result.bytes);
        assert!(samples.iter().all(|&s| s == 3));
        assert_eq!(session.frames_written() * 2, result.bytes);
        assert_eq!(backend.feed(&[3; 64]), None);
    }
}
