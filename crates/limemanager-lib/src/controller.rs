//! Per-board lifecycle: open → configure → calibrate → stream.
//!
//! A [`DeviceController`] is shared as `Arc<DeviceController>` between the
//! registry and whoever is driving the board. Two locks, always taken in
//! this order:
//!
//! - `session` holds the native handle and is kept for the whole of an
//!   operation, so operations on one board are serialized.
//! - `settings` holds the caller-visible state and is only held for short
//!   reads and updates, so status queries never wait on hardware.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::capture::{self, CaptureSummary, StreamConfig};
use crate::error::{Channel, LimeError, Result};
use crate::handle::HardwareHandle;
use crate::identity::DeviceId;
use crate::native::{self, Direction, Driver, NativeError};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Selection types ──

/// Analog front-end routing for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterPath {
    Low,
    High,
    #[default]
    Wide,
}

impl FilterPath {
    /// Native antenna index for this path.
    ///
    /// RX has three LNAs. TX only has two bands: Low and Wide share band 1,
    /// High uses band 2.
    pub fn antenna(self, dir: Direction) -> usize {
        match (dir, self) {
            (Direction::Rx, FilterPath::Low) => native::LMS_PATH_LNAL,
            (Direction::Rx, FilterPath::High) => native::LMS_PATH_LNAH,
            (Direction::Rx, FilterPath::Wide) => native::LMS_PATH_LNAW,
            (Direction::Tx, FilterPath::Low | FilterPath::Wide) => native::LMS_PATH_TX1,
            (Direction::Tx, FilterPath::High) => native::LMS_PATH_TX2,
        }
    }
}

impl fmt::Display for FilterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPath::Low => write!(f, "Low"),
            FilterPath::High => write!(f, "High"),
            FilterPath::Wide => write!(f, "Wide"),
        }
    }
}

impl FromStr for FilterPath {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(FilterPath::Low),
            "high" => Ok(FilterPath::High),
            "wide" => Ok(FilterPath::Wide),
            other => Err(format!(
                "unknown filter path \"{other}\" (expected Low, High or Wide)"
            )),
        }
    }
}

/// Selected channels and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Selection {
    pub rx_channel: usize,
    pub tx_channel: usize,
    pub rx_path: FilterPath,
    pub tx_path: FilterPath,
}

// ── Lifecycle ──

/// Persistent lifecycle stage. Ordered: later stages imply the earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum Stage {
    #[default]
    Unopened,
    Opened,
    Configured,
    Calibrated,
}

impl Stage {
    /// Stage after a successful open. Opening never moves a board backwards.
    pub fn after_open(self) -> Stage {
        self.max(Stage::Opened)
    }

    /// Stage after a sample rate was programmed.
    pub fn after_sample_rate(self) -> Stage {
        self.max(Stage::Configured)
    }

    /// Stage after both channels calibrated.
    pub fn after_calibration(self) -> Stage {
        Stage::Calibrated
    }

    /// Stage after a calibration attempt failed. A previously calibrated
    /// board drops back to `Configured`.
    pub fn after_failed_calibration(self) -> Stage {
        self.min(Stage::Configured)
    }

    pub fn is_open(self) -> bool {
        self != Stage::Unopened
    }
}

/// Caller-visible state: a stage, or streaming on top of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Unopened,
    Opened,
    Configured,
    Calibrated,
    /// Capturing; returns to `resume` when the capture ends.
    Streaming { resume: Stage },
}

impl From<Stage> for LifecycleState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Unopened => LifecycleState::Unopened,
            Stage::Opened => LifecycleState::Opened,
            Stage::Configured => LifecycleState::Configured,
            Stage::Calibrated => LifecycleState::Calibrated,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unopened => write!(f, "unopened"),
            LifecycleState::Opened => write!(f, "opened"),
            LifecycleState::Configured => write!(f, "configured"),
            LifecycleState::Calibrated => write!(f, "calibrated"),
            LifecycleState::Streaming { .. } => write!(f, "streaming"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CalibrationStatus {
    #[default]
    Uncalibrated,
    Calibrated,
    Failed,
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationStatus::Uncalibrated => write!(f, "not calibrated"),
            CalibrationStatus::Calibrated => write!(f, "calibrated"),
            CalibrationStatus::Failed => write!(f, "calibration failed"),
        }
    }
}

/// Everything a caller can observe about a controller.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Settings {
    pub stage: Stage,
    pub streaming: bool,
    pub selection: Selection,
    /// Last successfully programmed rate, in Hz.
    pub sample_rate: Option<f64>,
    pub calibration: CalibrationStatus,
}

impl Settings {
    pub fn state(&self) -> LifecycleState {
        if self.streaming {
            LifecycleState::Streaming { resume: self.stage }
        } else {
            self.stage.into()
        }
    }
}

/// Serializable status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub identity: DeviceId,
    pub serial: String,
    pub state: LifecycleState,
    #[serde(flatten)]
    pub selection: Selection,
    pub sample_rate: Option<f64>,
    pub calibration: CalibrationStatus,
}

// ── Controller ──

/// Lifecycle controller for one board.
pub struct DeviceController {
    id: DeviceId,
    driver: Arc<dyn Driver>,
    session: Mutex<Option<HardwareHandle>>,
    settings: Mutex<Settings>,
}

impl DeviceController {
    /// New controller in the `Unopened` stage. No native call is made.
    pub fn new(id: DeviceId, driver: Arc<dyn Driver>) -> Self {
        DeviceController {
            id,
            driver,
            session: Mutex::new(None),
            settings: Mutex::new(Settings::default()),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn serial(&self) -> &str {
        self.id.serial()
    }

    /// Snapshot of the observable settings.
    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.settings).state()
    }

    pub fn calibration(&self) -> CalibrationStatus {
        lock(&self.settings).calibration
    }

    /// Last programmed sample rate. Prefer this over [`get_sample_rate`](Self::get_sample_rate)
    /// for display; the readback is quantized by the hardware.
    pub fn last_sample_rate(&self) -> Option<f64> {
        lock(&self.settings).sample_rate
    }

    pub fn status(&self) -> DeviceStatus {
        let settings = self.settings();
        DeviceStatus {
            identity: self.id.clone(),
            serial: self.id.serial().to_string(),
            state: settings.state(),
            selection: settings.selection,
            sample_rate: settings.sample_rate,
            calibration: settings.calibration,
        }
    }

    /// Open and initialize the board, then apply the current selection.
    ///
    /// A no-op if the board is already open.
    pub fn open(&self) -> Result<()> {
        let mut session = self.lock_session();
        self.ensure_open(&mut session)?;
        Ok(())
    }

    /// Select the RX and TX channel. Applied immediately if the board is open,
    /// otherwise on the next open.
    pub fn set_channels(&self, rx: usize, tx: usize) -> Result<()> {
        let mut session = self.lock_session();
        let selection = self.update(|s| {
            s.selection.rx_channel = rx;
            s.selection.tx_channel = tx;
            s.selection
        });
        self.reapply(&mut session, &selection)
    }

    /// Select the RX and TX filter path. Same application rules as
    /// [`set_channels`](Self::set_channels).
    pub fn set_paths(&self, rx: FilterPath, tx: FilterPath) -> Result<()> {
        let mut session = self.lock_session();
        let selection = self.update(|s| {
            s.selection.rx_path = rx;
            s.selection.tx_path = tx;
            s.selection
        });
        self.reapply(&mut session, &selection)
    }

    /// Program the sample rate, opening the board first if needed.
    pub fn set_sample_rate(&self, rate: f64) -> Result<()> {
        validate_rate(rate)?;
        let mut session = self.lock_session();
        self.program_rate(&mut session, rate)
    }

    /// Program `rate`, then calibrate the selected RX channel followed by the
    /// selected TX channel with `rate` as the calibration bandwidth.
    ///
    /// The status only becomes `Calibrated` when both succeed; TX is not
    /// attempted if RX fails.
    pub fn calibrate(&self, rate: f64) -> Result<()> {
        validate_rate(rate)?;
        let mut session = self.lock_session();
        self.program_rate(&mut session, rate)?;
        let handle = session.as_mut().ok_or(LimeError::NotInitialized)?;

        let selection = self.settings().selection;
        let channels = [
            Channel {
                direction: Direction::Rx,
                index: selection.rx_channel,
            },
            Channel {
                direction: Direction::Tx,
                index: selection.tx_channel,
            },
        ];
        for channel in channels {
            if let Err(source) = handle.calibrate(channel.direction, channel.index, rate) {
                self.update(|s| {
                    s.calibration = CalibrationStatus::Failed;
                    s.stage = s.stage.after_failed_calibration();
                });
                log::warn!("{}: calibration of {channel} failed: {source}", self.label());
                return Err(LimeError::Calibration { channel, source });
            }
        }

        self.update(|s| {
            s.calibration = CalibrationStatus::Calibrated;
            s.stage = s.stage.after_calibration();
        });
        log::info!("{}: calibrated at {rate} Hz", self.label());
        Ok(())
    }

    /// Hardware readback of the host sample rate on the selected RX channel.
    pub fn get_sample_rate(&self) -> Result<f64> {
        let mut session = self.lock_session();
        let handle = session.as_mut().ok_or(LimeError::NotInitialized)?;
        let channel = self.settings().selection.rx_channel;
        let rate = handle
            .get_sample_rate(Direction::Rx, channel)
            .map_err(LimeError::Configuration)?;
        Ok(rate.host)
    }

    /// Capture from the selected RX channel into `sink` for `config.duration`.
    ///
    /// Opens the board if needed. The native stream is stopped and destroyed
    /// before this returns, on every path.
    pub fn stream(&self, sink: &mut dyn Write, config: &StreamConfig) -> Result<CaptureSummary> {
        config.validate()?;
        let mut session = self.lock_session();
        let handle = self.ensure_open(&mut session)?;
        let channel = self.settings().selection.rx_channel;

        let _streaming = StreamingFlag::raise(&self.settings);
        log::info!("{}: capturing RX channel {channel}", self.label());
        let summary = capture::run(handle, channel, sink, config)?;
        log::info!(
            "{}: captured {} samples in {} batches{}",
            self.label(),
            summary.samples,
            summary.batches,
            if summary.ended_early { " (ended early)" } else { "" }
        );
        Ok(summary)
    }

    // ── internals ──

    fn lock_session(&self) -> MutexGuard<'_, Option<HardwareHandle>> {
        lock(&self.session)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        f(&mut lock(&self.settings))
    }

    fn label(&self) -> String {
        self.id.label()
    }

    /// Unopened → Opened. Returns the open handle.
    fn ensure_open<'s>(
        &self,
        session: &'s mut Option<HardwareHandle>,
    ) -> Result<&'s mut HardwareHandle> {
        if session.is_none() {
            let handle =
                HardwareHandle::open(self.driver.as_ref(), &self.id).map_err(LimeError::Open)?;
            *session = Some(handle);
            self.update(|s| s.stage = s.stage.after_open());
            log::info!("{}: opened", self.label());

            let selection = self.settings().selection;
            if let Some(handle) = session.as_mut() {
                apply_selection(handle, &selection).map_err(LimeError::Configuration)?;
            }
        }
        session.as_mut().ok_or(LimeError::NotInitialized)
    }

    fn reapply(&self, session: &mut Option<HardwareHandle>, selection: &Selection) -> Result<()> {
        if let Some(handle) = session.as_mut() {
            apply_selection(handle, selection).map_err(LimeError::Configuration)?;
            log::debug!("{}: applied {selection:?}", self.label());
        }
        Ok(())
    }

    fn program_rate(&self, session: &mut Option<HardwareHandle>, rate: f64) -> Result<()> {
        let handle = self.ensure_open(session)?;
        handle
            .set_sample_rate(rate)
            .map_err(LimeError::Configuration)?;
        self.update(|s| {
            s.sample_rate = Some(rate);
            s.stage = s.stage.after_sample_rate();
        });
        log::info!("{}: sample rate set to {rate} Hz", self.label());
        Ok(())
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = session.take() {
            log::info!("{}: releasing device", self.id.label());
            drop(handle);
        }
    }
}

impl fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("id", &self.id)
            .field("settings", &self.settings())
            .finish()
    }
}

/// Sets `streaming` for as long as it lives.
struct StreamingFlag<'a>(&'a Mutex<Settings>);

impl<'a> StreamingFlag<'a> {
    fn raise(settings: &'a Mutex<Settings>) -> Self {
        lock(settings).streaming = true;
        StreamingFlag(settings)
    }
}

impl Drop for StreamingFlag<'_> {
    fn drop(&mut self) {
        lock(self.0).streaming = false;
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(LimeError::InvalidArgument(format!(
            "sample rate must be greater than zero (got {rate})"
        )));
    }
    Ok(())
}

/// Enable exactly the selected RX and TX channel, then route their antennas.
fn apply_selection(handle: &mut HardwareHandle, selection: &Selection) -> native::Result<()> {
    let plan = [
        (Direction::Rx, selection.rx_channel, selection.rx_path),
        (Direction::Tx, selection.tx_channel, selection.tx_path),
    ];
    for (dir, selected, path) in plan {
        let count = handle.num_channels(dir)?;
        if selected >= count {
            return Err(NativeError::new(
                "LMS_EnableChannel",
                format!("{dir} channel {selected} out of range (device has {count})"),
            ));
        }
        for channel in 0..count {
            handle.enable_channel(dir, channel, channel == selected)?;
        }
        handle.set_antenna(dir, selected, path.antenna(dir))?;
    }
    Ok(())
}
