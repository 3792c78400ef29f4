//! In-memory mock driver for unit and integration tests.
//!
//! Always compiled (zero runtime cost), hidden from public docs.
//! Devices opened from one [`MockDriver`] share its call log and fault
//! switches, so a test can script failures and then assert on the exact
//! sequence of native calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::*;

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Open(String),
    Init,
    EnableChannel(Direction, usize, bool),
    SetAntenna(Direction, usize, usize),
    SetSampleRate(f64),
    GetSampleRate(Direction, usize),
    Calibrate(Direction, usize, f64),
    SetupStream(StreamSpec),
    StartStream,
    RecvStream,
    StopStream,
    DestroyStream,
    Close,
}

/// Failure switches. Everything defaults to "succeed".
#[derive(Debug, Clone)]
pub struct Faults {
    pub list: bool,
    pub open: bool,
    pub init: bool,
    pub enable_channel: bool,
    pub set_antenna: bool,
    pub set_sample_rate: bool,
    pub get_sample_rate: bool,
    pub calibrate_rx: bool,
    pub calibrate_tx: bool,
    pub setup_stream: bool,
    pub start_stream: bool,
    pub stop_stream: bool,
    pub destroy_stream: bool,
    pub close: bool,
    /// Fail `recv_stream` after this many successful batches.
    pub recv_fail_after: Option<usize>,
    /// Return empty batches instead of data.
    pub recv_empty: bool,
    /// Simulated wait inside every `recv_stream`.
    pub recv_delay: Duration,
    /// Simulated wait inside every `list_devices`.
    pub list_delay: Duration,
    /// Channels per direction.
    pub channels: usize,
    /// If set, `get_sample_rate` reports this instead of the programmed rate.
    pub readback_rate: Option<f64>,
}

impl Default for Faults {
    fn default() -> Self {
        Faults {
            list: false,
            open: false,
            init: false,
            enable_channel: false,
            set_antenna: false,
            set_sample_rate: false,
            get_sample_rate: false,
            calibrate_rx: false,
            calibrate_tx: false,
            setup_stream: false,
            start_stream: false,
            stop_stream: false,
            destroy_stream: false,
            close: false,
            recv_fail_after: None,
            recv_empty: false,
            recv_delay: Duration::from_millis(1),
            list_delay: Duration::ZERO,
            channels: 2,
            readback_rate: None,
        }
    }
}

#[derive(Default)]
struct Shared {
    present: Mutex<Vec<DeviceId>>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
    open_handles: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock driver. Cloning yields another view onto the same state.
#[derive(Clone, Default)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver with the given descriptors attached.
    pub fn with_devices(descriptors: &[&str]) -> Self {
        let driver = Self::new();
        driver.set_present(descriptors);
        driver
    }

    /// Replace the set of attached boards (simulates hotplug).
    pub fn set_present(&self, descriptors: &[&str]) {
        *lock(&self.shared.present) = descriptors.iter().map(|d| DeviceId::new(d)).collect();
    }

    /// Mutable access to the fault switches.
    pub fn faults(&self) -> MutexGuard<'_, Faults> {
        lock(&self.shared.faults)
    }

    /// Snapshot of all calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.shared.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.shared.calls).clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.shared.calls).iter().filter(|c| pred(c)).count()
    }

    /// Sessions opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        lock(&self.shared.calls).push(call);
    }
}

impl Driver for MockDriver {
    fn list_devices(&self) -> Result<Vec<DeviceId>> {
        self.record(Call::List);
        let delay = self.faults().list_delay;
        std::thread::sleep(delay);
        if self.faults().list {
            return Err(NativeError::new("LMS_GetDeviceList", "mock: list failure injected"));
        }
        Ok(lock(&self.shared.present).clone())
    }

    fn open(&self, id: &DeviceId) -> Result<Box<dyn NativeDevice>> {
        self.record(Call::Open(id.descriptor()));
        if self.faults().open {
            return Err(NativeError::new("LMS_Open", "mock: open failure injected"));
        }
        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            driver: self.clone(),
            rate: 0.0,
            stream: None,
            running: false,
            batches: 0,
            closed: false,
        }))
    }
}

/// A session handed out by [`MockDriver::open`].
pub struct MockDevice {
    driver: MockDriver,
    rate: f64,
    stream: Option<StreamId>,
    running: bool,
    batches: usize,
    closed: bool,
}

impl MockDevice {
    fn fail_if(&self, fault: bool, call: &'static str) -> Result<()> {
        if fault {
            return Err(NativeError::new(call, "mock: failure injected"));
        }
        Ok(())
    }

    fn check_channel(&self, call: &'static str, channel: usize) -> Result<()> {
        if channel >= self.driver.faults().channels {
            return Err(NativeError::new(call, format!("invalid channel {channel}")));
        }
        Ok(())
    }
}

impl NativeDevice for MockDevice {
    fn init(&mut self) -> Result<()> {
        self.driver.record(Call::Init);
        self.fail_if(self.driver.faults().init, "LMS_Init")
    }

    fn num_channels(&mut self, _dir: Direction) -> Result<usize> {
        Ok(self.driver.faults().channels)
    }

    fn enable_channel(&mut self, dir: Direction, channel: usize, enabled: bool) -> Result<()> {
        self.driver.record(Call::EnableChannel(dir, channel, enabled));
        self.fail_if(self.driver.faults().enable_channel, "LMS_EnableChannel")?;
        self.check_channel("LMS_EnableChannel", channel)
    }

    fn set_antenna(&mut self, dir: Direction, channel: usize, path: usize) -> Result<()> {
        self.driver.record(Call::SetAntenna(dir, channel, path));
        self.fail_if(self.driver.faults().set_antenna, "LMS_SetAntenna")?;
        self.check_channel("LMS_SetAntenna", channel)
    }

    fn set_sample_rate(&mut self, rate: f64, _oversample: usize) -> Result<()> {
        self.driver.record(Call::SetSampleRate(rate));
        self.fail_if(self.driver.faults().set_sample_rate, "LMS_SetSampleRate")?;
        self.rate = rate;
        Ok(())
    }

    fn get_sample_rate(&mut self, dir: Direction, channel: usize) -> Result<SampleRate> {
        self.driver.record(Call::GetSampleRate(dir, channel));
        let faults = self.driver.faults().clone();
        self.fail_if(faults.get_sample_rate, "LMS_GetSampleRate")?;
        let host = faults.readback_rate.unwrap_or(self.rate);
        Ok(SampleRate {
            host,
            rf: host * 4.0,
        })
    }

    fn calibrate(&mut self, dir: Direction, channel: usize, bandwidth: f64) -> Result<()> {
        self.driver.record(Call::Calibrate(dir, channel, bandwidth));
        let faults = self.driver.faults().clone();
        let fault = match dir {
            Direction::Rx => faults.calibrate_rx,
            Direction::Tx => faults.calibrate_tx,
        };
        self.fail_if(fault, "LMS_Calibrate")
    }

    fn setup_stream(&mut self, spec: StreamSpec) -> Result<StreamId> {
        self.driver.record(Call::SetupStream(spec));
        self.fail_if(self.driver.faults().setup_stream, "LMS_SetupStream")?;
        if self.stream.is_some() {
            return Err(NativeError::new("LMS_SetupStream", "a stream is already set up"));
        }
        let id = StreamId(1);
        self.stream = Some(id);
        self.batches = 0;
        Ok(id)
    }

    fn start_stream(&mut self, _stream: StreamId) -> Result<()> {
        self.driver.record(Call::StartStream);
        self.fail_if(self.driver.faults().start_stream, "LMS_StartStream")?;
        self.running = true;
        Ok(())
    }

    fn recv_stream(
        &mut self,
        _stream: StreamId,
        buf: &mut [i16],
        _timeout_ms: u32,
    ) -> Result<usize> {
        self.driver.record(Call::RecvStream);
        let faults = self.driver.faults().clone();
        std::thread::sleep(faults.recv_delay);
        if !self.running {
            return Err(NativeError::new("LMS_RecvStream", "stream not running"));
        }
        if faults.recv_fail_after.is_some_and(|n| self.batches >= n) {
            return Err(NativeError::new("LMS_RecvStream", "mock: read failure injected"));
        }
        if faults.recv_empty {
            return Ok(0);
        }
        self.batches += 1;
        for (i, s) in buf.iter_mut().enumerate() {
            *s = (i % 2) as i16 * 100 + self.batches as i16;
        }
        Ok(buf.len() / 2)
    }

    fn stop_stream(&mut self, _stream: StreamId) -> Result<()> {
        self.driver.record(Call::StopStream);
        self.running = false;
        self.fail_if(self.driver.faults().stop_stream, "LMS_StopStream")
    }

    fn destroy_stream(&mut self, _stream: StreamId) -> Result<()> {
        self.driver.record(Call::DestroyStream);
        self.stream = None;
        self.fail_if(self.driver.faults().destroy_stream, "LMS_DestroyStream")
    }

    fn close(&mut self) -> Result<()> {
        self.driver.record(Call::Close);
        if !self.closed {
            self.closed = true;
            self.driver.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        self.fail_if(self.driver.faults().close, "LMS_Close")
    }
}
