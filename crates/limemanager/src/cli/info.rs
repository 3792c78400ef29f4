//! `info` and `init` subcommands — inspect and initialize the selected board.

use super::{
    DeviceStatus, Options, Result, format_rate, kv, kv_indent, kv_width, load_config,
    open_registry, prepare_device, print_json, select_device,
};

pub(super) fn cmd_info(opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let registry = open_registry()?;
    let device = select_device(&registry, opts, &config)?;
    let status = device.status();

    if opts.json {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

pub(super) fn cmd_init(opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let registry = open_registry()?;
    let device = prepare_device(&registry, opts, &config)?;
    device.open()?;
    println!("Initialized {}", device.id().label());
    print_status(&device.status());
    Ok(())
}

fn print_status(status: &DeviceStatus) {
    let w = kv_width(
        &["Device:", "Serial:", "State:", "Selection:"],
        &["RX:", "TX:", "Sample rate:", "Calibration:"],
    );
    kv("Device:", &status.identity, w);
    if status.serial.is_empty() {
        kv("Serial:", "(none)", w);
    } else {
        kv("Serial:", &status.serial, w);
    }
    kv("State:", status.state, w);
    println!("Selection:");
    let sel = &status.selection;
    kv_indent(
        "RX:",
        format_args!("channel {}, {} path", sel.rx_channel, sel.rx_path),
        w,
    );
    kv_indent(
        "TX:",
        format_args!("channel {}, {} path", sel.tx_channel, sel.tx_path),
        w,
    );
    match status.sample_rate {
        Some(rate) => kv_indent("Sample rate:", format_rate(rate), w),
        None => kv_indent("Sample rate:", "(not set)", w),
    }
    kv_indent("Calibration:", status.calibration, w);
}
