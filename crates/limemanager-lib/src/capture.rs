//! RX capture loop and sink encoding.
//!
//! Samples are written as interleaved I/Q `i16` pairs in native byte order,
//! with no header. That is the format LimeSuite's own tools and GNU Radio's
//! `short` file source read.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::controller::DeviceController;
use crate::error::{LimeError, Result};
use crate::handle::HardwareHandle;
use crate::native::{Direction, StreamSpec};

/// Capture parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// How long to capture for.
    pub duration: Duration,
    /// Native FIFO depth, in samples.
    pub fifo_size: u32,
    /// Complex samples requested per read.
    pub batch_samples: usize,
    /// Per-read timeout.
    pub timeout_ms: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            fifo_size: 1024 * 1024,
            batch_samples: 5000,
            timeout_ms: 1000,
        }
    }
}

impl StreamConfig {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_samples == 0 {
            return Err(LimeError::InvalidArgument(
                "batch size must be at least one sample".into(),
            ));
        }
        if self.fifo_size == 0 {
            return Err(LimeError::InvalidArgument(
                "FIFO size must be at least one sample".into(),
            ));
        }
        Ok(())
    }
}

/// What a capture produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    /// Non-empty batches written to the sink.
    pub batches: usize,
    /// Complex samples written.
    pub samples: usize,
    /// Bytes written.
    pub bytes: usize,
    /// The hardware stopped delivering before the deadline.
    pub ended_early: bool,
}

/// Write interleaved I/Q values in native byte order. Returns bytes written.
pub fn write_batch(sink: &mut dyn Write, iq: &[i16]) -> std::io::Result<usize> {
    let mut bytes = Vec::with_capacity(iq.len() * 2);
    for v in iq {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    sink.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Stream RX `channel` of an open handle into `sink` until the deadline.
///
/// A failed read ends the capture early and is reported through
/// [`CaptureSummary::ended_early`]; a failed write is an error. The stream is
/// torn down before the sink is flushed.
pub(crate) fn run(
    handle: &mut HardwareHandle,
    channel: usize,
    sink: &mut dyn Write,
    config: &StreamConfig,
) -> Result<CaptureSummary> {
    let spec = StreamSpec {
        direction: Direction::Rx,
        channel,
        fifo_size: config.fifo_size,
        throughput_vs_latency: 1.0,
    };
    let mut stream = handle.start_stream(spec).map_err(LimeError::Stream)?;
    let mut buf = vec![0i16; config.batch_samples * 2];
    let mut summary = CaptureSummary::default();

    let started = Instant::now();
    while started.elapsed() < config.duration {
        let samples = match stream.recv(&mut buf, config.timeout_ms) {
            Ok(n) => n.min(config.batch_samples),
            Err(e) => {
                log::warn!("capture ended early after {} samples: {e}", summary.samples);
                summary.ended_early = true;
                break;
            }
        };
        if samples == 0 {
            continue;
        }
        summary.bytes += write_batch(sink, &buf[..samples * 2])?;
        summary.samples += samples;
        summary.batches += 1;
    }
    drop(stream);

    sink.flush()?;
    Ok(summary)
}

/// Capture into a new file at `path` (truncating any existing one).
pub fn capture_to_file(
    controller: &DeviceController,
    path: &Path,
    config: &StreamConfig,
) -> Result<CaptureSummary> {
    let file = File::create(path)?;
    let mut sink = BufWriter::new(file);
    let summary = controller.stream(&mut sink, config)?;
    sink.flush()?;
    log::info!("wrote {} bytes to {}", summary.bytes, path.display());
    Ok(summary)
}
