//! `capture` subcommand — raw I/Q capture to a file.

use std::path::PathBuf;
use std::time::Duration;

use limemanager_lib::capture::{StreamConfig, capture_to_file};

use super::{
    CaptureOutput, Options, Result, format_rate, kv, kv_width, load_config, open_registry,
    prepare_device, print_json,
};

pub(super) fn cmd_capture(
    seconds: Option<u64>,
    output: Option<PathBuf>,
    rate: Option<f64>,
    opts: &Options,
) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let rate = rate.unwrap_or(config.sample_rate);
    let path = output.unwrap_or_else(|| config.capture_file());
    let stream = match seconds {
        Some(s) => StreamConfig::with_duration(Duration::from_secs(s)),
        None => config.stream_config(),
    };

    let registry = open_registry()?;
    let device = prepare_device(&registry, opts, &config)?;
    device.set_sample_rate(rate)?;

    if !opts.json {
        println!(
            "Capturing {}s from {} RX channel {} at {} into {}...",
            stream.duration.as_secs(),
            device.id().label(),
            device.settings().selection.rx_channel,
            format_rate(rate),
            path.display()
        );
    }
    let summary = capture_to_file(&device, &path, &stream)?;

    if opts.json {
        return print_json(&CaptureOutput {
            serial: device.serial().to_string(),
            path: path.display().to_string(),
            sample_rate: rate,
            summary,
        });
    }

    let w = kv_width(&["Samples:", "Batches:", "Bytes:", "Status:"], &[]);
    kv("Samples:", summary.samples, w);
    kv("Batches:", summary.batches, w);
    kv("Bytes:", summary.bytes, w);
    if summary.ended_early {
        kv("Status:", "ended early (device stopped delivering samples)", w);
    } else {
        kv("Status:", "complete", w);
    }
    Ok(())
}
