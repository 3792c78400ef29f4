//! LimeSuite backend — raw bindings to `libLimeSuite`.

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::ptr;

use super::*;

type LmsInfoStr = [c_char; crate::identity::INFO_LEN];

/// Opaque `lms_device_t`.
#[repr(C)]
struct LmsDevice {
    _private: [u8; 0],
}

const LMS_FMT_I16: c_int = 1;
const LMS_LINK_FMT_DEFAULT: c_int = 0;

/// Mirrors `lms_stream_t`. The driver writes `handle` during setup and reads
/// the struct on every stream call, so it must stay at a stable address.
#[repr(C)]
struct LmsStream {
    handle: usize,
    is_tx: bool,
    channel: u32,
    fifo_size: u32,
    throughput_vs_latency: f32,
    data_fmt: c_int,
    link_fmt: c_int,
}

/// Mirrors `lms_stream_meta_t`.
#[repr(C)]
struct LmsStreamMeta {
    timestamp: u64,
    wait_for_timestamp: bool,
    flush_partial_packet: bool,
}

#[link(name = "LimeSuite")]
unsafe extern "C" {
    fn LMS_GetDeviceList(dev_list: *mut LmsInfoStr) -> c_int;
    fn LMS_Open(device: *mut *mut LmsDevice, info: *const c_char, args: *mut c_void) -> c_int;
    fn LMS_Close(device: *mut LmsDevice) -> c_int;
    fn LMS_Init(device: *mut LmsDevice) -> c_int;
    fn LMS_GetNumChannels(device: *mut LmsDevice, dir_tx: bool) -> c_int;
    fn LMS_EnableChannel(device: *mut LmsDevice, dir_tx: bool, chan: usize, enabled: bool)
    -> c_int;
    fn LMS_SetAntenna(device: *mut LmsDevice, dir_tx: bool, chan: usize, index: usize) -> c_int;
    fn LMS_SetSampleRate(device: *mut LmsDevice, rate: f64, oversample: usize) -> c_int;
    fn LMS_GetSampleRate(
        device: *mut LmsDevice,
        dir_tx: bool,
        chan: usize,
        host_hz: *mut f64,
        rf_hz: *mut f64,
    ) -> c_int;
    fn LMS_Calibrate(
        device: *mut LmsDevice,
        dir_tx: bool,
        chan: usize,
        bw: f64,
        flags: c_uint,
    ) -> c_int;
    fn LMS_SetupStream(device: *mut LmsDevice, stream: *mut LmsStream) -> c_int;
    fn LMS_DestroyStream(device: *mut LmsDevice, stream: *mut LmsStream) -> c_int;
    fn LMS_StartStream(stream: *mut LmsStream) -> c_int;
    fn LMS_StopStream(stream: *mut LmsStream) -> c_int;
    fn LMS_RecvStream(
        stream: *mut LmsStream,
        samples: *mut c_void,
        sample_count: usize,
        meta: *mut LmsStreamMeta,
        timeout_ms: c_uint,
    ) -> c_int;
    fn LMS_GetLastErrorMessage() -> *const c_char;
}

fn last_error(call: &'static str) -> NativeError {
    // SAFETY: LimeSuite returns a pointer to a static, NUL-terminated buffer (or null).
    let message = unsafe {
        let msg = LMS_GetLastErrorMessage();
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    };
    NativeError::new(call, message)
}

fn check(call: &'static str, status: c_int) -> Result<()> {
    if status != 0 {
        return Err(last_error(call));
    }
    Ok(())
}

// ── Driver ──

#[derive(Debug, Default)]
pub struct LimeSuiteDriver;

impl Driver for LimeSuiteDriver {
    fn list_devices(&self) -> Result<Vec<DeviceId>> {
        // SAFETY: a null list asks only for the count.
        let count = unsafe { LMS_GetDeviceList(ptr::null_mut()) };
        if count < 0 {
            return Err(last_error("LMS_GetDeviceList"));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut list: Vec<LmsInfoStr> = vec![[0; crate::identity::INFO_LEN]; count as usize];
        // SAFETY: `list` holds `count` entries. The driver never writes more
        // entries than it reported a moment ago unless a board was plugged in
        // between the calls, which is why the second count is clamped below.
        let filled = unsafe { LMS_GetDeviceList(list.as_mut_ptr()) };
        if filled < 0 {
            return Err(last_error("LMS_GetDeviceList"));
        }
        list.truncate((filled as usize).min(count as usize));

        Ok(list
            .iter()
            .map(|entry| {
                let bytes: Vec<u8> = entry.iter().map(|&c| c as u8).collect();
                DeviceId::from_raw(&bytes)
            })
            .collect())
    }

    fn open(&self, id: &DeviceId) -> Result<Box<dyn NativeDevice>> {
        let mut device: *mut LmsDevice = ptr::null_mut();
        // SAFETY: `id.raw()` is a NUL-terminated 256-byte buffer, the layout LMS_Open expects.
        let status =
            unsafe { LMS_Open(&mut device, id.raw().as_ptr().cast(), ptr::null_mut()) };
        check("LMS_Open", status)?;
        if device.is_null() {
            return Err(NativeError::new("LMS_Open", "driver returned a null handle"));
        }
        Ok(Box::new(LimeDevice {
            device,
            stream: None,
        }))
    }
}

// ── Device ──

struct LimeDevice {
    device: *mut LmsDevice,
    stream: Option<Box<LmsStream>>,
}

// The handle is only ever used from the thread that currently owns the
// `LimeDevice`; LimeSuite does not tie sessions to their opening thread.
unsafe impl Send for LimeDevice {}

impl LimeDevice {
    fn stream_ptr(&mut self, call: &'static str) -> Result<*mut LmsStream> {
        self.stream
            .as_deref_mut()
            .map(|s| s as *mut LmsStream)
            .ok_or_else(|| NativeError::new(call, "no stream has been set up"))
    }
}

impl NativeDevice for LimeDevice {
    fn init(&mut self) -> Result<()> {
        check("LMS_Init", unsafe { LMS_Init(self.device) })
    }

    fn num_channels(&mut self, dir: Direction) -> Result<usize> {
        let n = unsafe { LMS_GetNumChannels(self.device, dir.is_tx()) };
        if n < 0 {
            return Err(last_error("LMS_GetNumChannels"));
        }
        Ok(n as usize)
    }

    fn enable_channel(&mut self, dir: Direction, channel: usize, enabled: bool) -> Result<()> {
        check("LMS_EnableChannel", unsafe {
            LMS_EnableChannel(self.device, dir.is_tx(), channel, enabled)
        })
    }

    fn set_antenna(&mut self, dir: Direction, channel: usize, path: usize) -> Result<()> {
        check("LMS_SetAntenna", unsafe {
            LMS_SetAntenna(self.device, dir.is_tx(), channel, path)
        })
    }

    fn set_sample_rate(&mut self, rate: f64, oversample: usize) -> Result<()> {
        check("LMS_SetSampleRate", unsafe {
            LMS_SetSampleRate(self.device, rate, oversample)
        })
    }

    fn get_sample_rate(&mut self, dir: Direction, channel: usize) -> Result<SampleRate> {
        let mut rate = SampleRate::default();
        check("LMS_GetSampleRate", unsafe {
            LMS_GetSampleRate(
                self.device,
                dir.is_tx(),
                channel,
                &mut rate.host,
                &mut rate.rf,
            )
        })?;
        Ok(rate)
    }

    fn calibrate(&mut self, dir: Direction, channel: usize, bandwidth: f64) -> Result<()> {
        check("LMS_Calibrate", unsafe {
            LMS_Calibrate(self.device, dir.is_tx(), channel, bandwidth, 0)
        })
    }

    fn setup_stream(&mut self, spec: StreamSpec) -> Result<StreamId> {
        if self.stream.is_some() {
            return Err(NativeError::new("LMS_SetupStream", "a stream is already set up"));
        }
        let mut stream = Box::new(LmsStream {
            handle: 0,
            is_tx: spec.direction.is_tx(),
            channel: spec.channel as u32,
            fifo_size: spec.fifo_size,
            throughput_vs_latency: spec.throughput_vs_latency,
            data_fmt: LMS_FMT_I16,
            link_fmt: LMS_LINK_FMT_DEFAULT,
        });
        check("LMS_SetupStream", unsafe {
            LMS_SetupStream(self.device, &mut *stream)
        })?;
        let id = StreamId(stream.handle);
        self.stream = Some(stream);
        Ok(id)
    }

    fn start_stream(&mut self, _stream: StreamId) -> Result<()> {
        let s = self.stream_ptr("LMS_StartStream")?;
        check("LMS_StartStream", unsafe { LMS_StartStream(s) })
    }

    fn recv_stream(
        &mut self,
        _stream: StreamId,
        buf: &mut [i16],
        timeout_ms: u32,
    ) -> Result<usize> {
        let s = self.stream_ptr("LMS_RecvStream")?;
        let mut meta = LmsStreamMeta {
            timestamp: 0,
            wait_for_timestamp: false,
            flush_partial_packet: false,
        };
        // SAFETY: `buf` holds buf.len() / 2 interleaved I/Q pairs in I16 format.
        let n = unsafe {
            LMS_RecvStream(
                s,
                buf.as_mut_ptr().cast(),
                buf.len() / 2,
                &mut meta,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(last_error("LMS_RecvStream"));
        }
        Ok(n as usize)
    }

    fn stop_stream(&mut self, _stream: StreamId) -> Result<()> {
        let s = self.stream_ptr("LMS_StopStream")?;
        check("LMS_StopStream", unsafe { LMS_StopStream(s) })
    }

    fn destroy_stream(&mut self, _stream: StreamId) -> Result<()> {
        let s = self.stream_ptr("LMS_DestroyStream")?;
        let status = unsafe { LMS_DestroyStream(self.device, s) };
        // The descriptor is useless after a destroy attempt either way.
        self.stream = None;
        check("LMS_DestroyStream", status)
    }

    fn close(&mut self) -> Result<()> {
        if self.device.is_null() {
            return Ok(());
        }
        let status = unsafe { LMS_Close(self.device) };
        self.device = ptr::null_mut();
        check("LMS_Close", status)
    }
}
