//! Unified error type for the limemanager-lib crate.
//!
//! Every failed native call is classified by the operation that issued it
//! (`Open`, `Configuration`, `Calibration`, `Stream`, `Enumeration`), so a
//! caller can tell "the board refused the sample rate" from "the board is
//! gone" without parsing messages.

use std::fmt;

use crate::native::{Direction, NativeError};

/// A specific RX or TX channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub direction: Direction,
    pub index: usize,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channel {}", self.direction, self.index)
    }
}

/// Unified error type for limemanager-lib operations.
#[derive(Debug)]
pub enum LimeError {
    /// Bad caller input (e.g. a non-positive sample rate).
    InvalidArgument(String),
    /// The operation needs an open session and there is none.
    NotInitialized,
    /// Opening or initializing the board failed.
    Open(NativeError),
    /// Channel, path or sample-rate programming failed.
    Configuration(NativeError),
    /// Calibration failed on the named channel.
    Calibration {
        channel: Channel,
        source: NativeError,
    },
    /// Stream setup or start failed.
    Stream(NativeError),
    /// Listing attached boards failed.
    Enumeration(NativeError),
    /// No attached board matches the requested serial.
    NotFound(String),
    /// Standard I/O error (capture sink, config persistence).
    Io(std::io::Error),
    /// Configuration file validation error.
    Config(String),
}

impl fmt::Display for LimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimeError::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            LimeError::NotInitialized => write!(f, "Device not initialized"),
            LimeError::Open(e) => write!(f, "Failed to open device: {e}"),
            LimeError::Configuration(e) => write!(f, "Configuration failed: {e}"),
            LimeError::Calibration { channel, source } => {
                write!(f, "Failed to calibrate {channel}: {source}")
            }
            LimeError::Stream(e) => write!(f, "Streaming failed: {e}"),
            LimeError::Enumeration(e) => write!(f, "Failed to get device list: {e}"),
            LimeError::NotFound(e) => write!(f, "Device not found: {e}"),
            LimeError::Io(e) => write!(f, "I/O error: {e}"),
            LimeError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for LimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LimeError::Open(e)
            | LimeError::Configuration(e)
            | LimeError::Stream(e)
            | LimeError::Enumeration(e) => Some(e),
            LimeError::Calibration { source, .. } => Some(source),
            LimeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LimeError {
    fn from(e: std::io::Error) -> Self {
        LimeError::Io(e)
    }
}

/// Crate-level Result alias using [`LimeError`].
pub type Result<T> = std::result::Result<T, LimeError>;
