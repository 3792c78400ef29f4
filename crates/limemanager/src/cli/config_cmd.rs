//! `config` subcommand — show current configuration and file paths.

use super::{
    ConfigOutput, Options, Result, config_file, format_rate, kv, kv_indent, kv_width, load_config,
    print_json,
};

pub(super) fn cmd_config(opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let config_path = config_file(opts);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate(None) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if opts.json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        };
        return print_json(&output);
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "device_serial:",
            "sample_rate:",
            "rx_channel:",
            "tx_channel:",
            "rx_path:",
            "tx_path:",
            "poll_interval_ms:",
            "capture_seconds:",
            "capture_path:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    if config.device_serial.is_empty() {
        kv_indent("device_serial:", "(first device)", w);
    } else {
        kv_indent("device_serial:", &config.device_serial, w);
    }
    kv_indent(
        "sample_rate:",
        format_args!("{} ({})", config.sample_rate, format_rate(config.sample_rate)),
        w,
    );
    kv_indent("rx_channel:", config.rx_channel, w);
    kv_indent("tx_channel:", config.tx_channel, w);
    kv_indent("rx_path:", &config.rx_path, w);
    kv_indent("tx_path:", &config.tx_path, w);
    kv_indent("poll_interval_ms:", config.poll_interval_ms, w);
    kv_indent("capture_seconds:", config.capture_seconds, w);
    kv_indent("capture_path:", config.capture_file().display(), w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_config_with_missing_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let opts = Options {
            json: false,
            serial: None,
            config_path: Some(dir.path().join("config.toml")),
        };
        assert!(cmd_config(&opts).is_ok());
    }

    #[test]
    fn cmd_config_json_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sample_rate = 0.0\n").unwrap();
        let opts = Options {
            json: true,
            serial: None,
            config_path: Some(path),
        };
        assert!(cmd_config(&opts).is_ok());
    }
}
