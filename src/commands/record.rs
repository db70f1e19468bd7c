//! Audio recording with a live level and spectrum meter.
//!
//! Enter stops and keeps the recording, Ctrl-C cancels and deletes it. The
//! path of a kept recording goes to stdout so it can be piped.

use anyhow::anyhow;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use workbench_voice::config::VoiceConfig;
use workbench_voice::recording::{AudioRecordingResult, Recorder, Visualizer};

const METER_REFRESH: Duration = Duration::from_millis(50);
const LEVEL_WIDTH: usize = 30;
const BAND_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Command-line overrides for a single recording.
#[derive(Debug, Default, Clone)]
pub struct RecordArgs {
    pub device: Option<String>,
    pub max_seconds: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub no_spectrum: bool,
}

/// Records until Enter, Ctrl-C, or the configured limit.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the visualizer options are invalid
/// - If the recording cannot be started
pub async fn handle_record(args: RecordArgs) -> Result<(), anyhow::Error> {
    tracing::info!("=== wbvoice recorder started ===");

    let mut config = VoiceConfig::load()?;
    if let Some(device) = args.device {
        config.audio.device = device;
    }
    if let Some(max_seconds) = args.max_seconds {
        config.audio.max_duration_secs = max_seconds;
    }
    if let Some(output_dir) = args.output_dir {
        config.audio.output_dir = output_dir;
    }
    if args.no_spectrum {
        config.visualizer.spectrum_enabled = false;
    }

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, max_duration={}s, bands={}, fft={}",
        config.audio.device,
        config.audio.sample_rate,
        config.audio.max_duration_secs,
        config.visualizer.band_count,
        config.visualizer.fft_size
    );

    let (mut visualizer, tap) = Visualizer::new(&config.visualizer, config.audio.sample_rate)?;
    let mut options = config.audio.recording_options();
    options.tap = Some(Box::new(tap));

    let recorder = Recorder::new(config.audio.device.clone());
    let session = recorder
        .start_until(options, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .map_err(|e| anyhow!("Failed to start recording: {e}"))?;
    visualizer.start();

    eprintln!("Recording... press Enter to stop, Ctrl-C to cancel.");
    let mut enter = spawn_enter_listener();
    let model = visualizer.model();
    let mut bands = vec![0.0f32; model.band_count()];
    let mut ticker = tokio::time::interval(METER_REFRESH);

    let result = loop {
        tokio::select! {
            result = session.completion() => break result,
            Some(()) = enter.recv() => break session.stop(),
            _ = ticker.tick() => {
                let level = model.copy_snapshot(&mut bands);
                eprint!("\r{}", render_meter(level, &bands));
                let _ = std::io::stderr().flush();
            }
        }
    };

    visualizer.shutdown().await;
    eprintln!();
    report(&result);
    Ok(())
}

/// Reads stdin on a detached thread and signals once per line.
fn spawn_enter_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        // EOF means no interactive input; leave stopping to the limit or Ctrl-C
        if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx.blocking_send(());
        }
    });
    rx
}

/// One-line meter: a level bar followed by one glyph per band.
fn render_meter(level: f32, bands: &[f32]) -> String {
    let filled = ((level * LEVEL_WIDTH as f32).round() as usize).min(LEVEL_WIDTH);
    let mut line = String::with_capacity(LEVEL_WIDTH + bands.len() * 3 + 4);
    line.push('[');
    line.extend(std::iter::repeat('#').take(filled));
    line.extend(std::iter::repeat(' ').take(LEVEL_WIDTH - filled));
    line.push_str("] ");
    for &band in bands {
        let index = ((band * (BAND_GLYPHS.len() - 1) as f32).round() as usize)
            .min(BAND_GLYPHS.len() - 1);
        line.push(BAND_GLYPHS[index]);
    }
    line
}

fn report(result: &AudioRecordingResult) {
    if result.canceled {
        tracing::info!("Recording canceled by user");
        eprintln!("Recording canceled.");
        return;
    }

    eprintln!(
        "Recorded {:.1}s ({} bytes, {} Hz).",
        result.duration.as_secs_f64(),
        result.bytes,
        result.format.sample_rate_hz
    );
    for path in &result.paths {
        println!("{}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_meter_extremes() {
        let silent = render_meter(0.0, &[0.0, 0.0]);
        assert_eq!(silent, format!("[{}] ▁▁", " ".repeat(LEVEL_WIDTH)));

        let loud = render_meter(1.0, &[1.0, 0.5]);
        assert!(loud.starts_with(&format!("[{}]", "#".repeat(LEVEL_WIDTH))));
        assert!(loud.ends_with("█▅"));
    }
}
