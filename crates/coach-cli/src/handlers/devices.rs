//! Devices command handler.

use anyhow::{Context, Result};
use coach_voice::capture::list_input_devices;

/// List the host's audio input devices, marking the default one.
pub fn execute() -> Result<()> {
    let devices = list_input_devices().context("Failed to enumerate audio input devices")?;
    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.name);
    }
    Ok(())
}
