//! Exclusive native session for one board.
//!
//! [`HardwareHandle`] is the single owner of a [`NativeDevice`]. It is
//! released exactly once: on drop, any stream left behind is stopped and
//! destroyed first, then the session is closed. Native calls are never made
//! after that.

use crate::identity::DeviceId;
use crate::native::{
    self, Direction, Driver, NativeDevice, NativeError, SampleRate, StreamId, StreamSpec,
};

/// Stream bookkeeping so teardown can run in the right order from any exit path.
#[derive(Debug, Clone, Copy)]
struct StreamSlot {
    id: StreamId,
    running: bool,
}

pub struct HardwareHandle {
    device: Box<dyn NativeDevice>,
    id: DeviceId,
    stream: Option<StreamSlot>,
}

impl HardwareHandle {
    /// Open and initialize a session.
    ///
    /// If initialization fails the session is closed before the error is
    /// returned, so no native resource outlives a failed open.
    pub fn open(driver: &dyn Driver, id: &DeviceId) -> native::Result<Self> {
        if id.is_empty() {
            return Err(NativeError::new("LMS_Open", "device identity is empty"));
        }
        log::debug!("opening {id}");
        let device = driver.open(id)?;
        let mut handle = HardwareHandle {
            device,
            id: id.clone(),
            stream: None,
        };
        if let Err(e) = handle.device.init() {
            drop(handle);
            return Err(e);
        }
        log::debug!("initialized {id}");
        Ok(handle)
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn num_channels(&mut self, dir: Direction) -> native::Result<usize> {
        self.device.num_channels(dir)
    }

    pub fn enable_channel(
        &mut self,
        dir: Direction,
        channel: usize,
        enabled: bool,
    ) -> native::Result<()> {
        self.device.enable_channel(dir, channel, enabled)
    }

    pub fn set_antenna(
        &mut self,
        dir: Direction,
        channel: usize,
        path: usize,
    ) -> native::Result<()> {
        self.device.set_antenna(dir, channel, path)
    }

    pub fn set_sample_rate(&mut self, rate: f64) -> native::Result<()> {
        self.device.set_sample_rate(rate, 0)
    }

    pub fn get_sample_rate(
        &mut self,
        dir: Direction,
        channel: usize,
    ) -> native::Result<SampleRate> {
        self.device.get_sample_rate(dir, channel)
    }

    pub fn calibrate(
        &mut self,
        dir: Direction,
        channel: usize,
        bandwidth: f64,
    ) -> native::Result<()> {
        self.device.calibrate(dir, channel, bandwidth)
    }

    /// Set up and start a stream. The returned guard tears it down when dropped.
    pub fn start_stream(&mut self, spec: StreamSpec) -> native::Result<ActiveStream<'_>> {
        if self.stream.is_some() {
            // Leftover from a leaked guard; clear it before reusing the device.
            self.teardown_stream();
        }
        let id = self.device.setup_stream(spec)?;
        self.stream = Some(StreamSlot { id, running: false });
        let mut active = ActiveStream { handle: self, id };
        active.handle.device.start_stream(id)?;
        if let Some(slot) = active.handle.stream.as_mut() {
            slot.running = true;
        }
        Ok(active)
    }

    /// Stop (if running) and destroy the current stream.
    ///
    /// Failures are logged and otherwise ignored: teardown runs on error
    /// paths and must not replace the error that got us here.
    fn teardown_stream(&mut self) {
        let Some(slot) = self.stream.take() else {
            return;
        };
        if slot.running {
            match self.device.stop_stream(slot.id) {
                Ok(()) => log::debug!("stream stopped on {}", self.id),
                Err(e) => log::warn!("could not stop stream on {}: {e}", self.id),
            }
        }
        if let Err(e) = self.device.destroy_stream(slot.id) {
            log::warn!("could not destroy stream on {}: {e}", self.id);
        }
    }
}

impl Drop for HardwareHandle {
    fn drop(&mut self) {
        self.teardown_stream();
        match self.device.close() {
            Ok(()) => log::debug!("closed {}", self.id),
            Err(e) => log::warn!("could not close {}: {e}", self.id),
        }
    }
}

/// A started stream. Dropping it stops and destroys the stream.
pub struct ActiveStream<'a> {
    handle: &'a mut HardwareHandle,
    id: StreamId,
}

impl ActiveStream<'_> {
    /// Read one batch of interleaved I/Q samples; returns complex samples read.
    pub fn recv(&mut self, buf: &mut [i16], timeout_ms: u32) -> native::Result<usize> {
        self.handle.device.recv_stream(self.id, buf, timeout_ms)
    }
}

impl Drop for ActiveStream<'_> {
    fn drop(&mut self) {
        self.handle.teardown_stream();
    }
}
