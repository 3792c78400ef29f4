//! Native driver boundary — trait + LimeSuite backend.
//!
//! Every call here is synchronous and may block for a long time (USB
//! round-trips, on-chip calibration). Nothing in this module knows about
//! lifecycle ordering; that lives in [`crate::handle`] and
//! [`crate::controller`].

use std::fmt;
use std::sync::Arc;

use crate::identity::DeviceId;

#[cfg(feature = "limesuite")]
mod limesuite;
#[doc(hidden)]
pub mod mock;

#[cfg(feature = "limesuite")]
pub use limesuite::LimeSuiteDriver;

// ── Error type ──

/// A failed native call.
///
/// `call` names the driver entry point (e.g. `"LMS_Init"`), `message` is the
/// driver's own explanation, typically from `LMS_GetLastErrorMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeError {
    pub call: &'static str,
    pub message: String,
}

impl NativeError {
    pub fn new(call: &'static str, message: impl Into<String>) -> Self {
        NativeError {
            call,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} failed", self.call)
        } else {
            write!(f, "{}: {}", self.call, self.message)
        }
    }
}

impl std::error::Error for NativeError {}

pub type Result<T> = std::result::Result<T, NativeError>;

// ── Boundary types ──

/// Signal direction of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn is_tx(self) -> bool {
        matches!(self, Direction::Tx)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// RX antenna: high-band LNA.
pub const LMS_PATH_LNAH: usize = 1;
/// RX antenna: low-band LNA.
pub const LMS_PATH_LNAL: usize = 2;
/// RX antenna: wide-band LNA.
pub const LMS_PATH_LNAW: usize = 3;
/// TX antenna: band 1.
pub const LMS_PATH_TX1: usize = 1;
/// TX antenna: band 2.
pub const LMS_PATH_TX2: usize = 2;

/// Parameters for a single-channel I16 stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSpec {
    pub direction: Direction,
    pub channel: usize,
    /// FIFO depth in samples.
    pub fifo_size: u32,
    /// 0.0 favours latency, 1.0 favours throughput.
    pub throughput_vs_latency: f32,
}

/// Opaque reference to a stream set up on a native device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamId(pub usize);

/// Sample rate as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleRate {
    /// Rate seen by the host, in Hz.
    pub host: f64,
    /// Rate at the RF side (host rate × oversampling), in Hz.
    pub rf: f64,
}

// ── Traits ──

/// Entry point of a vendor driver: enumeration and open.
pub trait Driver: Send + Sync {
    /// List the identity tokens of all currently attached boards.
    fn list_devices(&self) -> Result<Vec<DeviceId>>;

    /// Open an exclusive session to one board. The session is not yet initialized.
    fn open(&self, id: &DeviceId) -> Result<Box<dyn NativeDevice>>;
}

/// One open native session. Dropping it without calling [`close`](Self::close)
/// leaks the native handle; [`crate::handle::HardwareHandle`] guarantees the call.
pub trait NativeDevice: Send {
    fn init(&mut self) -> Result<()>;
    fn num_channels(&mut self, dir: Direction) -> Result<usize>;
    fn enable_channel(&mut self, dir: Direction, channel: usize, enabled: bool) -> Result<()>;
    fn set_antenna(&mut self, dir: Direction, channel: usize, path: usize) -> Result<()>;
    /// `oversample` of 0 lets the driver choose.
    fn set_sample_rate(&mut self, rate: f64, oversample: usize) -> Result<()>;
    fn get_sample_rate(&mut self, dir: Direction, channel: usize) -> Result<SampleRate>;
    fn calibrate(&mut self, dir: Direction, channel: usize, bandwidth: f64) -> Result<()>;

    fn setup_stream(&mut self, spec: StreamSpec) -> Result<StreamId>;
    fn start_stream(&mut self, stream: StreamId) -> Result<()>;
    /// Read interleaved I/Q samples into `buf`. Returns the number of complex
    /// samples read; 0 means the timeout elapsed with no data.
    fn recv_stream(&mut self, stream: StreamId, buf: &mut [i16], timeout_ms: u32)
    -> Result<usize>;
    fn stop_stream(&mut self, stream: StreamId) -> Result<()>;
    fn destroy_stream(&mut self, stream: StreamId) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

// ── Stub driver for builds without LimeSuite ──

/// Driver that sees no hardware.
/// Enables compilation and `cargo test` on hosts without LimeSuite.
#[cfg(not(feature = "limesuite"))]
#[derive(Debug, Default)]
pub struct StubDriver;

#[cfg(not(feature = "limesuite"))]
impl Driver for StubDriver {
    fn list_devices(&self) -> Result<Vec<DeviceId>> {
        Ok(Vec::new())
    }

    fn open(&self, _id: &DeviceId) -> Result<Box<dyn NativeDevice>> {
        Err(NativeError::new(
            "LMS_Open",
            "built without LimeSuite support (enable the `limesuite` feature)",
        ))
    }
}

/// Concrete driver type for this build.
#[cfg(feature = "limesuite")]
pub type PlatformDriver = LimeSuiteDriver;
#[cfg(not(feature = "limesuite"))]
pub type PlatformDriver = StubDriver;

/// The driver for this build, ready to share between registry and controllers.
pub fn platform_driver() -> Arc<dyn Driver> {
    Arc::new(PlatformDriver::default())
}
