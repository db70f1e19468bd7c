//! Application command handlers for wbvoice.
//!
//! # Commands
//! - `record`: Capture audio with a live level/spectrum meter
//! - `list_devices`: List available audio input devices
//! - `logs`: Display recent log entries

pub mod list_devices;
pub mod logs;
pub mod record;

pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::{handle_record, RecordArgs};
