//! Output artifact naming and WAV writer creation.

use chrono::Utc;
use hound::WavWriter;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::error::Result;
use super::format::AudioFormat;

/// Incremental PCM16 WAV writer used by a session.
pub type PcmWriter = WavWriter<BufWriter<File>>;

/// Builds a unique output path: `<dir>/<prefix>-<UTC timestamp>-<random>.wav`.
pub fn output_path(output_dir: &Path, prefix: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple();
    output_dir.join(format!("{prefix}-{timestamp}-{suffix}.wav"))
}

/// Creates the output directory if needed and opens a WAV writer at a fresh path.
///
/// # Errors
/// - If the directory cannot be created
/// - If the file cannot be created or the header cannot be written
pub fn create_writer(
    output_dir: &Path,
    prefix: &str,
    format: &AudioFormat,
) -> Result<(PathBuf, PcmWriter)> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, prefix);
    let writer = WavWriter::create(&path, format.wav_spec())?;
    tracing::debug!("Recording output opened: {}", path.display());
    Ok((path, writer))
}

/// Removes a file, ignoring failures.
pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed canceled recording: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove {}: {}", path.display(), e),
    }
}
