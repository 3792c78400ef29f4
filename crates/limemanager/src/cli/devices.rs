//! `devices` subcommand — list attached LimeSDR boards.

use super::{DeviceJson, DevicesOutput, Options, Result, open_registry, print_json};

pub(super) fn cmd_devices(opts: &Options) -> Result<()> {
    let registry = open_registry()?;
    let devices = registry.get_devices();

    if opts.json {
        let output = DevicesOutput {
            count: devices.len(),
            devices: devices
                .iter()
                .map(|d| DeviceJson::from_controller(d))
                .collect(),
        };
        return print_json(&output);
    }

    if devices.is_empty() {
        println!("No LimeSDR devices found.");
        return Ok(());
    }

    println!(
        "Found {} LimeSDR device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {}", i + 1, dev.id());
        if !dev.serial().is_empty() {
            println!("      Serial: {}", dev.serial());
        }
    }

    Ok(())
}
