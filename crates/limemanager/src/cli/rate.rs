//! `rate` subcommand — program the sample rate and read it back.

use super::{
    Options, RateOutput, Result, format_rate, kv, kv_width, load_config, open_registry,
    prepare_device, print_json,
};

pub(super) fn cmd_rate(hz: Option<f64>, opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let rate = hz.unwrap_or(config.sample_rate);

    let registry = open_registry()?;
    let device = prepare_device(&registry, opts, &config)?;
    device.set_sample_rate(rate)?;
    let readback = device.get_sample_rate()?;

    if opts.json {
        return print_json(&RateOutput {
            serial: device.serial().to_string(),
            programmed: rate,
            readback,
        });
    }

    let w = kv_width(&["Device:", "Programmed:", "Hardware:"], &[]);
    kv("Device:", device.id().label(), w);
    kv("Programmed:", format_rate(rate), w);
    kv("Hardware:", format_rate(readback), w);
    Ok(())
}
