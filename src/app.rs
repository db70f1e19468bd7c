//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

use crate::commands;
use crate::logging;

/// Microphone recorder with a live level and spectrum meter
#[derive(Parser)]
#[command(name = "wbvoice")]
#[command(version)]
#[command(long_about = "Microphone recorder with a live level and spectrum meter.\n\nRecordings are written as mono 16-bit WAV files. The path of a finished\nrecording is printed to stdout.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nEXAMPLES:\n    # Record until Enter, print the file path\n    $ wbvoice\n\n    # Record at most 30 seconds into ./takes\n    $ wbvoice record --max-seconds 30 --output-dir takes\n\n    # Pick a device by index from list-devices\n    $ wbvoice record --device 2")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/wbvoice/wbvoice.toml\n    Logs:               ~/.local/state/wbvoice/wbvoice.log.*\n    Environment:        WBVOICE_VIZ_* override visualizer settings"
)]
struct Cli {
    #[command(flatten)]
    record: RecordFlags,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default, Clone)]
struct RecordFlags {
    /// Input device: "default", a name, or an index from list-devices
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Stop after this many seconds (0 for no limit)
    #[arg(short = 't', long, value_name = "SECONDS", global = true)]
    max_seconds: Option<u64>,

    /// Directory for recordings
    #[arg(short, long, value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Show only the level meter
    #[arg(long, global = true)]
    no_spectrum: bool,
}

impl From<RecordFlags> for commands::RecordArgs {
    fn from(flags: RecordFlags) -> Self {
        Self {
            device: flags.device,
            max_seconds: flags.max_seconds,
            output_dir: flags.output_dir,
            no_spectrum: flags.no_spectrum,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record audio with a live meter (default)
    ///
    /// Press Enter to stop and keep the recording, Ctrl-C to cancel.
    #[command(visible_alias = "r")]
    Record,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the correct input device in wbvoice.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   wbvoice completions bash > wbvoice.bash
    ///   wbvoice completions zsh > _wbvoice
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that don't need logging
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "wbvoice", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            return exit_on_error(commands::handle_list_devices());
        }
        Some(Commands::Logs) => {
            return exit_on_error(commands::handle_logs());
        }
        None | Some(Commands::Record) => {}
    }

    logging::init_logging()?;

    if let Err(e) = commands::handle_record(cli.record.into()).await {
        tracing::error!("Recording failed: {e}");
        return Err(e);
    }
    Ok(())
}

fn exit_on_error(result: Result<(), anyhow::Error>) -> Result<(), anyhow::Error> {
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_flags_without_subcommand() {
        let cli = Cli::try_parse_from(["wbvoice", "-t", "30", "--no-spectrum"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.record.max_seconds, Some(30));
        assert!(cli.record.no_spectrum);
    }

    #[test]
    fn test_record_subcommand_accepts_flags() {
        let cli = Cli::try_parse_from(["wbvoice", "record", "--device", "2"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Record)));
        assert_eq!(cli.record.device.as_deref(), Some("2"));
    }
}
