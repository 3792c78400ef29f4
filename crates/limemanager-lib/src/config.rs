//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::StreamConfig;
use crate::controller::FilterPath;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# limemanager configuration. Unknown keys are ignored; missing keys use defaults.\n\n";

/// Lowest sample rate accepted from the config file, in Hz.
pub const MIN_SAMPLE_RATE: f64 = 1e3;
/// Highest sample rate accepted from the config file, in Hz.
pub const MAX_SAMPLE_RATE: f64 = 100e6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial of the board to use. Empty picks the first attached board.
    #[serde(default)]
    pub device_serial: String,

    /// Sample rate in Hz for `rate`, `calibrate` and `capture`. Default: 5 MHz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Selected RX channel (0-based).
    #[serde(default)]
    pub rx_channel: usize,

    /// Selected TX channel (0-based).
    #[serde(default)]
    pub tx_channel: usize,

    /// RX filter path: "Low", "High" or "Wide".
    #[serde(default = "default_path")]
    pub rx_path: String,

    /// TX filter path: "Low", "High" or "Wide".
    #[serde(default = "default_path")]
    pub tx_path: String,

    /// Hotplug poll interval for `watch`, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Default capture length in seconds.
    #[serde(default = "default_capture_seconds")]
    pub capture_seconds: u64,

    /// Capture output file. Empty = `capture.bin` in the working directory.
    #[serde(default)]
    pub capture_path: String,
}

fn default_sample_rate() -> f64 {
    5e6
}
fn default_path() -> String {
    "Wide".into()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_capture_seconds() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_serial: String::new(),
            sample_rate: default_sample_rate(),
            rx_channel: 0,
            tx_channel: 0,
            rx_path: default_path(),
            tx_path: default_path(),
            poll_interval_ms: default_poll_interval_ms(),
            capture_seconds: default_capture_seconds(),
            capture_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    SampleRateOutOfRange(f64),
    InvalidPath { field: &'static str, reason: String },
    ZeroPollInterval,
    ZeroCaptureSeconds,
    ChannelOutOfRange {
        field: &'static str,
        channel: usize,
        count: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::SampleRateOutOfRange(rate) => write!(
                f,
                "Sample rate {rate} Hz is out of range ({MIN_SAMPLE_RATE} to {MAX_SAMPLE_RATE} Hz)"
            ),
            ValidationError::InvalidPath { field, reason } => write!(f, "Invalid {field}: {reason}"),
            ValidationError::ZeroPollInterval => write!(f, "Poll interval must be greater than zero"),
            ValidationError::ZeroCaptureSeconds => {
                write!(f, "Capture length must be greater than zero")
            }
            ValidationError::ChannelOutOfRange {
                field,
                channel,
                count,
            } => write!(
                f,
                "Invalid {field}: channel {channel} is out of range (device has {count} channel{})",
                if *count == 1 { "" } else { "s" }
            ),
        }
    }
}

impl Config {
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("limemanager"))
    }

    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Cross-device rename: write in place and drop the temp file.
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load from `path`. A missing file gives defaults silently; an unparsable
    /// one gives defaults plus a warning.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    pub fn rx_filter_path(&self) -> Result<FilterPath, String> {
        self.rx_path.parse()
    }

    pub fn tx_filter_path(&self) -> Result<FilterPath, String> {
        self.tx_path.parse()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Capture output, falling back to `capture.bin` in the working directory.
    pub fn capture_file(&self) -> PathBuf {
        let path = self.capture_path.trim();
        if path.is_empty() {
            PathBuf::from("capture.bin")
        } else {
            PathBuf::from(path)
        }
    }

    /// Capture parameters for a run of `capture_seconds`.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::with_duration(Duration::from_secs(self.capture_seconds))
    }

    /// Check every field. With `channel_count` known (from an opened device),
    /// channel indices are range-checked too.
    pub fn validate(
        &self,
        channel_count: Option<usize>,
    ) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            errors.push(ValidationError::SampleRateOutOfRange(self.sample_rate));
        }

        if let Err(reason) = self.rx_filter_path() {
            errors.push(ValidationError::InvalidPath {
                field: "rx_path",
                reason,
            });
        }
        if let Err(reason) = self.tx_filter_path() {
            errors.push(ValidationError::InvalidPath {
                field: "tx_path",
                reason,
            });
        }

        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::ZeroPollInterval);
        }
        if self.capture_seconds == 0 {
            errors.push(ValidationError::ZeroCaptureSeconds);
        }

        if let Some(count) = channel_count {
            for (field, channel) in [("rx_channel", self.rx_channel), ("tx_channel", self.tx_channel)]
            {
                if channel >= count {
                    errors.push(ValidationError::ChannelOutOfRange {
                        field,
                        channel,
                        count,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.device_serial, "");
        assert_eq!(c.sample_rate, 5e6);
        assert_eq!(c.rx_channel, 0);
        assert_eq!(c.tx_channel, 0);
        assert_eq!(c.rx_path, "Wide");
        assert_eq!(c.tx_path, "Wide");
        assert_eq!(c.poll_interval_ms, 1000);
        assert_eq!(c.capture_seconds, 10);
        assert!(c.validate(None).is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("sample_rate = 10000000.0\nrx_path = \"Low\"\n").unwrap();
        assert_eq!(c.sample_rate, 10e6);
        assert_eq!(c.rx_filter_path().unwrap(), FilterPath::Low);
        assert_eq!(c.tx_filter_path().unwrap(), FilterPath::Wide);
        assert_eq!(c.poll_interval_ms, 1000);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn config_path_ends_with_toml() {
        if let Some(p) = Config::path() {
            assert!(p.ends_with("limemanager/config.toml"));
        }
    }

    #[test]
    fn capture_file_default_and_override() {
        assert_eq!(Config::default().capture_file(), PathBuf::from("capture.bin"));
        let c = Config {
            capture_path: " /tmp/rx.iq ".into(),
            ..Config::default()
        };
        assert_eq!(c.capture_file(), PathBuf::from("/tmp/rx.iq"));
    }

    #[test]
    fn stream_config_uses_capture_seconds() {
        let c = Config {
            capture_seconds: 3,
            ..Config::default()
        };
        let sc = c.stream_config();
        assert_eq!(sc.duration, Duration::from_secs(3));
        assert_eq!(sc.batch_samples, StreamConfig::default().batch_samples);
    }

    // ── validate ──

    #[test]
    fn validate_sample_rate_range() {
        for rate in [0.0, 999.0, 100.5e6, f64::NAN] {
            let c = Config {
                sample_rate: rate,
                ..Config::default()
            };
            let errs = c.validate(None).unwrap_err();
            assert!(matches!(errs[0], ValidationError::SampleRateOutOfRange(_)));
        }
        for rate in [1e3, 100e6] {
            let c = Config {
                sample_rate: rate,
                ..Config::default()
            };
            assert!(c.validate(None).is_ok());
        }
    }

    #[test]
    fn validate_bad_path() {
        let c = Config {
            tx_path: "Medium".into(),
            ..Config::default()
        };
        let errs = c.validate(None).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(matches!(
            &errs[0],
            ValidationError::InvalidPath { field: "tx_path", .. }
        ));
    }

    #[test]
    fn validate_channels_only_with_count() {
        let c = Config {
            rx_channel: 2,
            ..Config::default()
        };
        assert!(c.validate(None).is_ok());
        let errs = c.validate(Some(2)).unwrap_err();
        assert_eq!(
            errs,
            vec![ValidationError::ChannelOutOfRange {
                field: "rx_channel",
                channel: 2,
                count: 2
            }]
        );
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let c = Config {
            sample_rate: -1.0,
            rx_path: "nope".into(),
            poll_interval_ms: 0,
            capture_seconds: 0,
            ..Config::default()
        };
        assert_eq!(c.validate(None).unwrap_err().len(), 4);
    }

    #[test]
    fn validation_error_display() {
        assert_eq!(
            ValidationError::ZeroPollInterval.to_string(),
            "Poll interval must be greater than zero"
        );
        let e = ValidationError::ChannelOutOfRange {
            field: "tx_channel",
            channel: 1,
            count: 1,
        };
        assert_eq!(
            e.to_string(),
            "Invalid tx_channel: channel 1 is out of range (device has 1 channel)"
        );
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            device_serial: "0009060B00471B22".into(),
            sample_rate: 10e6,
            rx_channel: 1,
            tx_channel: 1,
            rx_path: "High".into(),
            tx_path: "Low".into(),
            poll_interval_ms: 250,
            capture_seconds: 2,
            capture_path: "/tmp/out.iq".into(),
        };
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# limemanager configuration"));
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn save_to_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/config.toml");
        Config::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(&dir.path().join("nonexistent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn wrong_type_gives_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sample_rate = \"fast\"\n").unwrap();
        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.sample_rate, 5e6);
    }
}
