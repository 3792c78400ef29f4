//! `calibrate` subcommand — calibrate the selected RX and TX channels.

use super::{
    CalibrateOutput, Options, Result, format_rate, load_config, open_registry, prepare_device,
    print_json,
};

pub(super) fn cmd_calibrate(hz: Option<f64>, opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let rate = hz.unwrap_or(config.sample_rate);

    let registry = open_registry()?;
    let device = prepare_device(&registry, opts, &config)?;
    if !opts.json {
        println!(
            "Calibrating {} at {} (this can take a few seconds)...",
            device.id().label(),
            format_rate(rate)
        );
    }
    device.calibrate(rate)?;

    let settings = device.settings();
    if opts.json {
        return print_json(&CalibrateOutput {
            serial: device.serial().to_string(),
            sample_rate: rate,
            rx_channel: settings.selection.rx_channel,
            tx_channel: settings.selection.tx_channel,
            calibration: settings.calibration,
        });
    }
    println!(
        "Calibrated RX channel {} and TX channel {}",
        settings.selection.rx_channel, settings.selection.tx_channel
    );
    Ok(())
}
