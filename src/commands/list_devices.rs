//! List available audio input devices.

use anyhow::anyhow;
use workbench_voice::recording::cpal_backend::{list_input_devices, InputDeviceInfo};

/// Lists all available audio input devices on the system.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    let devices =
        list_input_devices().map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?;

    if devices.is_empty() {
        println!("No audio input devices found on this system.");
        return Ok(());
    }

    println!("Available audio input devices:");
    println!();
    for device in &devices {
        print!("{}", describe(device));
    }

    Ok(())
}

fn describe(device: &InputDeviceInfo) -> String {
    let default_indicator = if device.is_default { " [DEFAULT]" } else { "" };
    let config_info = match device.default_config {
        Some((sample_rate, channels)) => format!("{sample_rate}Hz, {channels} channels"),
        None => "configuration unavailable".to_string(),
    };
    format!(
        "  ID: {}\n    Name: {}{}\n    Config: {}\n\n",
        device.index, device.name, default_indicator, config_info
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_default_device() {
        let text = describe(&InputDeviceInfo {
            index: 2,
            name: "USB Mic".to_string(),
            is_default: true,
            default_config: Some((48000, 1)),
        });
        assert!(text.contains("ID: 2"));
        assert!(text.contains("USB Mic [DEFAULT]"));
        assert!(text.contains("48000Hz, 1 channels"));
    }
}
