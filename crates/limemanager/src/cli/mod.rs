//! CLI subcommands — discovery, configuration, calibration, capture, hotplug watch.

mod calibrate;
mod capture;
mod config_cmd;
mod devices;
mod info;
mod rate;
mod select;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use limemanager_lib::capture::CaptureSummary;
pub(super) use limemanager_lib::config::Config;
pub(super) use limemanager_lib::controller::{
    CalibrationStatus, DeviceController, DeviceStatus, FilterPath,
};
pub(super) use limemanager_lib::error::{LimeError, Result};
pub(super) use limemanager_lib::registry::DeviceRegistry;
use limemanager_lib::native;

const PADDING: usize = 2;

/// Global flags shared by every subcommand.
pub struct Options {
    pub json: bool,
    pub serial: Option<String>,
    pub config_path: Option<PathBuf>,
}

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Human-readable sample rate: `5 MHz`, `30.72 MHz`, `250 kHz`.
pub(super) fn format_rate(hz: f64) -> String {
    let (value, unit) = if hz.abs() >= 1e6 {
        (hz / 1e6, "MHz")
    } else if hz.abs() >= 1e3 {
        (hz / 1e3, "kHz")
    } else {
        (hz, "Hz")
    };
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {unit}")
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

// ── Config / device plumbing ──

/// Load the config from `custom_path` or the platform default, logging any
/// parse or validation problems.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    if let Err(errors) = config.validate(None) {
        for e in &errors {
            log::warn!("[config] {e}");
        }
    }
    config
}

/// Where `--save` writes to.
pub(super) fn config_file(opts: &Options) -> Option<PathBuf> {
    opts.config_path.clone().or_else(Config::path)
}

pub(super) fn save_config(config: &Config, opts: &Options) -> Result<PathBuf> {
    let path = config_file(opts)
        .ok_or_else(|| LimeError::Config("no config directory on this platform".into()))?;
    config.save_to(&path)?;
    Ok(path)
}

pub(super) fn config_paths(config: &Config) -> Result<(FilterPath, FilterPath)> {
    let rx = config
        .rx_filter_path()
        .map_err(|e| LimeError::Config(format!("rx_path: {e}")))?;
    let tx = config
        .tx_filter_path()
        .map_err(|e| LimeError::Config(format!("tx_path: {e}")))?;
    Ok((rx, tx))
}

/// Enumerate attached boards once.
pub(super) fn open_registry() -> Result<Arc<DeviceRegistry>> {
    let registry = Arc::new(DeviceRegistry::new(native::platform_driver()));
    registry.refresh()?;
    Ok(registry)
}

/// The board named by `--serial`, else `device_serial` from the config, else
/// the first attached board.
pub(super) fn select_device(
    registry: &DeviceRegistry,
    opts: &Options,
    config: &Config,
) -> Result<Arc<DeviceController>> {
    let serial = opts.serial.as_deref().unwrap_or(&config.device_serial);
    registry.select(serial)
}

/// Select a board and record the configured channels and paths on it. Nothing
/// is sent to the hardware until the board is opened.
pub(super) fn prepare_device(
    registry: &DeviceRegistry,
    opts: &Options,
    config: &Config,
) -> Result<Arc<DeviceController>> {
    let device = select_device(registry, opts, config)?;
    let (rx_path, tx_path) = config_paths(config)?;
    device.set_channels(config.rx_channel, config.tx_channel)?;
    device.set_paths(rx_path, tx_path)?;
    Ok(device)
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DeviceJson {
    pub serial: Option<String>,
    pub identity: String,
}

impl DeviceJson {
    pub fn from_controller(device: &DeviceController) -> Self {
        let serial = device.serial();
        DeviceJson {
            serial: (!serial.is_empty()).then(|| serial.to_string()),
            identity: device.id().descriptor(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DeviceJson>,
}

#[derive(Serialize)]
pub(super) struct RateOutput {
    pub serial: String,
    pub programmed: f64,
    pub readback: f64,
}

#[derive(Serialize)]
pub(super) struct CalibrateOutput {
    pub serial: String,
    pub sample_rate: f64,
    pub rx_channel: usize,
    pub tx_channel: usize,
    pub calibration: CalibrationStatus,
}

#[derive(Serialize)]
pub(super) struct CaptureOutput {
    pub serial: String,
    pub path: String,
    pub sample_rate: f64,
    #[serde(flatten)]
    pub summary: CaptureSummary,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List attached LimeSDR boards
    Devices,

    /// Show identity and state of the selected board
    Info,

    /// Open and initialize the selected board
    Init,

    /// Program the sample rate and read back what the hardware chose
    Rate {
        /// Sample rate in Hz (default: sample_rate from config)
        hz: Option<f64>,
    },

    /// Select RX/TX channels and apply them to the board
    Channels {
        /// RX channel (default: rx_channel from config)
        #[arg(long)]
        rx: Option<usize>,
        /// TX channel (default: tx_channel from config)
        #[arg(long)]
        tx: Option<usize>,
        /// Also store the selection in the config file
        #[arg(long)]
        save: bool,
    },

    /// Select RX/TX filter paths (Low, High, Wide) and apply them to the board
    Paths {
        /// RX path (default: rx_path from config)
        #[arg(long)]
        rx: Option<FilterPath>,
        /// TX path (default: tx_path from config)
        #[arg(long)]
        tx: Option<FilterPath>,
        /// Also store the selection in the config file
        #[arg(long)]
        save: bool,
    },

    /// Calibrate the selected RX and TX channels at a sample rate
    Calibrate {
        /// Sample rate and calibration bandwidth in Hz (default: sample_rate from config)
        hz: Option<f64>,
    },

    /// Capture raw I/Q samples (interleaved native-endian i16) to a file
    Capture {
        /// Capture length in seconds (default: capture_seconds from config)
        #[arg(long)]
        seconds: Option<u64>,
        /// Output file (default: capture_path from config)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Sample rate in Hz (default: sample_rate from config)
        #[arg(long)]
        rate: Option<f64>,
    },

    /// Watch for boards being attached and detached (Ctrl+C to stop)
    Watch {
        /// Poll interval in milliseconds (default: poll_interval_ms from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &Options) -> Result<()> {
    match cmd {
        Command::Devices => devices::cmd_devices(opts),
        Command::Info => info::cmd_info(opts),
        Command::Init => {
            if opts.json {
                warn_json_unsupported("init");
            }
            info::cmd_init(opts)
        }
        Command::Rate { hz } => rate::cmd_rate(hz, opts),
        Command::Channels { rx, tx, save } => {
            if opts.json {
                warn_json_unsupported("channels");
            }
            select::cmd_channels(rx, tx, save, opts)
        }
        Command::Paths { rx, tx, save } => {
            if opts.json {
                warn_json_unsupported("paths");
            }
            select::cmd_paths(rx, tx, save, opts)
        }
        Command::Calibrate { hz } => calibrate::cmd_calibrate(hz, opts),
        Command::Capture {
            seconds,
            output,
            rate,
        } => capture::cmd_capture(seconds, output, rate, opts),
        Command::Watch { interval_ms } => watch::cmd_watch(interval_ms, opts),
        Command::Config => config_cmd::cmd_config(opts),
    }
}


#[cfg(test)]
mod json_output_tests {
    use super::*;

    #[test]
    fn devices_output_empty() {
        let output = DevicesOutput {
            count: 0,
            devices: vec![],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["count"], 0);
        assert!(parsed["devices"].as_array().unwrap().is_empty());
    }

    #[test]
    fn devices_output_missing_serial_is_null() {
        let output = DevicesOutput {
            count: 2,
            devices: vec![
                DeviceJson {
                    serial: Some("0009060B00471B22".into()),
                    identity: "LimeSDR-USB, serial=0009060B00471B22".into(),
                },
                DeviceJson {
                    serial: None,
                    identity: "LimeSDR Mini, addr=1".into(),
                },
            ],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        let devices = parsed["devices"].as_array().unwrap();
        assert_eq!(devices[0]["serial"], "0009060B00471B22");
        assert!(devices[1]["serial"].is_null());
    }

    #[test]
    fn capture_output_flattens_summary() {
        let output = CaptureOutput {
            serial: "X".into(),
            path: "capture.bin".into(),
            sample_rate: 5e6,
            summary: CaptureSummary {
                batches: 2,
                samples: 10_000,
                bytes: 40_000,
                ended_early: false,
            },
        };
        let parsed = serde_json::to_value(&output).unwrap();
        let obj = parsed.as_object().unwrap();
        assert_eq!(obj.len(), 7);
        assert_eq!(parsed["bytes"], 40_000);
        assert_eq!(parsed["ended_early"], false);
    }

    #[test]
    fn config_output_includes_settings() {
        let output = ConfigOutput {
            config_file: None,
            config_file_exists: false,
            settings: Config::default(),
            problems: vec![],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert!(parsed["config_file"].is_null());
        assert_eq!(parsed["settings"]["sample_rate"], 5e6);
        assert_eq!(parsed["settings"]["rx_path"], "Wide");
    }
}
