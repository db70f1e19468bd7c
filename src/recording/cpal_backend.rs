//! Production capture backend built on cpal.
//!
//! Resolves the configured input device, negotiates a stream configuration at
//! the requested sample rate, and converts whatever the device delivers into
//! mono PCM16 before handing it to the session callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Mutex, PoisonError};

use super::backend::{AudioCallback, CallbackFlow, CaptureBackend, CaptureStream};
use super::error::{RecordingError, Result};
use super::format::AudioFormat;
use super::subsystem::SubsystemRefCount;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Sessions currently holding the audio host.
static SUBSYSTEM: SubsystemRefCount = SubsystemRefCount::new();

/// Host selected when the subsystem was initialized.
static ACTIVE_HOST: Mutex<Option<cpal::HostId>> = Mutex::new(None);

/// Records from a named or default input device through the system audio host.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    /// Device name, numeric index, or "default"
    device_name: String,
}

impl CpalBackend {
    /// Creates a backend for a device name/index, or "default" for the system default.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    fn host(&self) -> Result<cpal::Host> {
        let host_id = *ACTIVE_HOST.lock().unwrap_or_else(PoisonError::into_inner);
        match host_id {
            Some(id) => cpal::host_from_id(id).map_err(|e| RecordingError::Subsystem(e.to_string())),
            None => Err(RecordingError::Subsystem(
                "audio host used before initialization".to_string(),
            )),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new("default")
    }
}

impl CaptureBackend for CpalBackend {
    fn acquire(&self) -> Result<()> {
        SUBSYSTEM.acquire(|| {
            let host_id = cpal::default_host().id();
            *ACTIVE_HOST.lock().unwrap_or_else(PoisonError::into_inner) = Some(host_id);
            tracing::info!("Audio host: {}", host_id.name());
            Ok(())
        })
    }

    fn release(&self) {
        SUBSYSTEM.release(|| {
            ACTIVE_HOST
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        });
    }

    fn open_input(
        &self,
        format: &AudioFormat,
        frames_per_buffer: u32,
        callback: Box<dyn AudioCallback>,
    ) -> Result<Box<dyn CaptureStream>> {
        let host = self.host()?;

        // Get device while suppressing ALSA library warnings
        let device = suppress_alsa_warnings(|| resolve_device(&host, &self.device_name))?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let selection = select_stream_config(&device, format, frames_per_buffer)?;
        tracing::debug!(
            "Device configuration: {}Hz, {} channels, {:?}, buffer {:?}",
            selection.config.sample_rate.0,
            selection.config.channels,
            selection.sample_format,
            selection.config.buffer_size
        );

        let stream = build_stream(&device, &selection, callback)?;
        Ok(Box::new(CpalStream { stream }))
    }
}

/// Resolves "default", a numeric index, or a device name to an input device.
///
/// # Errors
/// - If the default device is missing
/// - If no device with the specified name/index is found
pub fn resolve_device(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    if device_spec == "default" {
        return host.default_input_device().ok_or(RecordingError::NoInputDevice);
    }

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| RecordingError::Subsystem(format!("failed to enumerate devices: {e}")))?
        .collect();

    // Try to parse as a numeric index first
    if let Ok(index) = device_spec.parse::<usize>() {
        return devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| RecordingError::DeviceNotFound(device_spec.to_string()));
    }

    devices
        .into_iter()
        .find(|device| device.name().map(|name| name == device_spec).unwrap_or(false))
        .ok_or_else(|| RecordingError::DeviceNotFound(device_spec.to_string()))
}

struct StreamSelection {
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

/// Picks an input configuration at the requested rate, preferring mono i16.
fn select_stream_config(
    device: &cpal::Device,
    format: &AudioFormat,
    frames_per_buffer: u32,
) -> Result<StreamSelection> {
    let rate = cpal::SampleRate(format.sample_rate_hz);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| RecordingError::UnsupportedDevice(e.to_string()))?;

    let best = ranges
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter(|range| {
            matches!(
                range.sample_format(),
                cpal::SampleFormat::I16 | cpal::SampleFormat::F32
            )
        })
        .min_by_key(|range| {
            (
                range.channels() != 1,
                range.sample_format() != cpal::SampleFormat::I16,
                range.channels(),
            )
        })
        .ok_or_else(|| {
            RecordingError::UnsupportedDevice(format!(
                "no {}Hz i16/f32 input configuration",
                format.sample_rate_hz
            ))
        })?;

    let buffer_size = match best.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if frames_per_buffer > 0 => {
            cpal::BufferSize::Fixed(frames_per_buffer.clamp(*min, *max))
        }
        _ => cpal::BufferSize::Default,
    };

    let supported = best.with_sample_rate(rate);
    let sample_format = supported.sample_format();
    let mut config: cpal::StreamConfig = supported.into();
    config.buffer_size = buffer_size;

    Ok(StreamSelection {
        config,
        sample_format,
    })
}

fn build_stream(
    device: &cpal::Device,
    selection: &StreamSelection,
    callback: Box<dyn AudioCallback>,
) -> Result<cpal::Stream> {
    let mut driver = CallbackDriver::new(callback, usize::from(selection.config.channels));
    let error_callback = |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
    };

    let stream = match selection.sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &selection.config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| driver.push_i16(data),
            error_callback,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &selection.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| driver.push_f32(data),
            error_callback,
            None,
        ),
        other => {
            return Err(RecordingError::UnsupportedDevice(format!(
                "sample format {other:?}"
            )))
        }
    };

    stream.map_err(|e| RecordingError::StreamBuild(e.to_string()))
}

/// Adapts raw device blocks to mono PCM16 for the session callback.
///
/// Runs on the audio thread. The scratch buffer grows to the largest block
/// seen and is never shrunk.
struct CallbackDriver {
    callback: Box<dyn AudioCallback>,
    channels: usize,
    scratch: Vec<i16>,
    finished: bool,
}

impl CallbackDriver {
    fn new(callback: Box<dyn AudioCallback>, channels: usize) -> Self {
        Self {
            callback,
            channels: channels.max(1),
            scratch: Vec::new(),
            finished: false,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        if self.finished || data.is_empty() {
            return;
        }
        let flow = if self.channels == 1 {
            self.callback.on_audio(data)
        } else {
            let frames = self.downmix(data, i32::from);
            self.callback.on_audio(&self.scratch[..frames])
        };
        self.finished = flow != CallbackFlow::Continue;
    }

    fn push_f32(&mut self, data: &[f32]) {
        if self.finished || data.is_empty() {
            return;
        }
        let frames = self.downmix(data, f32_to_pcm);
        let flow = self.callback.on_audio(&self.scratch[..frames]);
        self.finished = flow != CallbackFlow::Continue;
    }

    /// Averages interleaved channels into the scratch buffer, returning the frame count.
    fn downmix<T: Copy>(&mut self, data: &[T], to_pcm: impl Fn(T) -> i32) -> usize {
        let frames = data.len() / self.channels;
        if self.scratch.len() < frames {
            self.scratch.resize(frames, 0);
        }

        let divisor = self.channels as i32;
        for (slot, chunk) in self
            .scratch
            .iter_mut()
            .zip(data.chunks_exact(self.channels))
        {
            let sum: i32 = chunk.iter().map(|&s| to_pcm(s)).sum();
            *slot = (sum / divisor) as i16;
        }
        frames
    }
}

fn f32_to_pcm(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i32
}

/// Owns a cpal stream for the session.
struct CpalStream {
    stream: cpal::Stream,
}

// cpal marks streams !Send for platforms that require thread affinity. The
// session only plays, pauses and drops it while holding its stream mutex.
unsafe impl Send for CpalStream {}

impl CaptureStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| RecordingError::StreamControl(e.to_string()))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| RecordingError::StreamControl(e.to_string()))
    }
}

/// An input device as shown by `list-devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    /// Position usable as the device setting
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    /// Default (sample rate, channels), if the device reports one
    pub default_config: Option<(u32, u16)>,
}

/// Enumerates input devices on the default host in index order.
///
/// Devices whose name cannot be read are skipped.
///
/// # Errors
/// - If the host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>> {
    suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| RecordingError::Subsystem(format!("failed to enumerate devices: {e}")))?;

        // Indices count every device so they match `resolve_device`
        Ok(devices
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                let default_config = device
                    .default_input_config()
                    .ok()
                    .map(|config| (config.sample_rate().0, config.channels()));
                Some(InputDeviceInfo {
                    index,
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    default_config,
                })
            })
            .collect())
    })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
/// On non-Linux platforms, this is a no-op since ALSA doesn't exist.
#[cfg(target_os = "linux")]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new().write(true).open("/dev/null")?;
    let dev_null_fd = dev_null.as_raw_fd();

    // Save the current stderr file descriptor
    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(std::io::Error::last_os_error().into());
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(std::io::Error::last_os_error().into());
    }

    let result = f();

    // Restore the original stderr
    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms, no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Collect {
        blocks: Arc<Mutex<Vec<Vec<i16>>>>,
        stop_after: usize,
    }

    impl AudioCallback for Collect {
        fn on_audio(&mut self, samples: &[i16]) -> CallbackFlow {
            let mut blocks = self.blocks.lock().unwrap();
            blocks.push(samples.to_vec());
            if blocks.len() >= self.stop_after {
                CallbackFlow::Complete
            } else {
                CallbackFlow::Continue
            }
        }
    }

    fn driver(channels: usize, stop_after: usize) -> (CallbackDriver, Arc<Mutex<Vec<Vec<i16>>>>) {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        let callback = Collect {
            blocks: Arc::clone(&blocks),
            stop_after,
        };
        (CallbackDriver::new(Box::new(callback), channels), blocks)
    }

    #[test]
    fn test_mono_i16_passes_through() {
        let (mut driver, blocks) = driver(1, usize::MAX);
        driver.push_i16(&[1, -2, 3]);
        assert_eq!(blocks.lock().unwrap()[0], vec![1, -2, 3]);
        assert!(driver.scratch.is_empty());
    }

    #[test]
    fn test_stereo_is_averaged_to_mono() {
        let (mut driver, blocks) = driver(2, usize::MAX);
        driver.push_i16(&[100, 200, -50, 50, 7, 9]);
        assert_eq!(blocks.lock().unwrap()[0], vec![150, 0, 8]);

        // Smaller block reuses the grown scratch buffer
        driver.push_i16(&[10, 20]);
        assert_eq!(blocks.lock().unwrap()[1], vec![15]);
        assert_eq!(driver.scratch.len(), 3);
    }

    #[test]
    fn test_f32_is_converted_and_clamped() {
        let (mut driver, blocks) = driver(1, usize::MAX);
        driver.push_f32(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(
            blocks.lock().unwrap()[0],
            vec![0, i16::MAX, -i16::MAX, i16::MAX]
        );
    }

    #[test]
    fn test_blocks_ignored_after_completion() {
        let (mut driver, blocks) = driver(1, 1);
        driver.push_i16(&[1, 2]);
        driver.push_i16(&[3, 4]);
        assert_eq!(blocks.lock().unwrap().len(), 1);
    }
}
