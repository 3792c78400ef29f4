//! Device identity — the raw enumeration token and the serial parsed out of it.
//!
//! LimeSuite hands out each board as a fixed 256-byte descriptor string
//! (`lms_info_str_t`), e.g.
//! `LimeSDR-USB, media=USB 3.0, module=FX3, addr=1d50:6108, serial=0009060B00471B22`.
//! Two identities are the same board exactly when their raw bytes match; the
//! serial is only for display.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

/// Size of a native identity token, including the terminating NUL.
pub const INFO_LEN: usize = 256;

/// Immutable enumeration token for one physical board.
#[derive(Clone)]
pub struct DeviceId {
    raw: [u8; INFO_LEN],
    serial: String,
}

impl DeviceId {
    /// Build an identity from raw token bytes.
    ///
    /// Everything from the first NUL onwards is zeroed so that stale bytes
    /// left in a native buffer never take part in comparisons. Input longer
    /// than `INFO_LEN - 1` bytes is truncated to keep the terminator.
    pub fn from_raw(bytes: &[u8]) -> Self {
        let mut raw = [0u8; INFO_LEN];
        let end = bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(bytes.len())
            .min(INFO_LEN - 1);
        raw[..end].copy_from_slice(&bytes[..end]);
        let serial = parse_serial(&String::from_utf8_lossy(&raw[..end]));
        DeviceId { raw, serial }
    }

    /// Build an identity from a descriptor string.
    pub fn new(descriptor: &str) -> Self {
        Self::from_raw(descriptor.as_bytes())
    }

    /// Token bytes up to (not including) the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.raw.iter().position(|&b| b == 0).unwrap_or(INFO_LEN);
        &self.raw[..end]
    }

    /// The full zero-padded native buffer.
    pub fn raw(&self) -> &[u8; INFO_LEN] {
        &self.raw
    }

    /// Descriptor as text (lossy for non-UTF-8 tokens).
    pub fn descriptor(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// Human-readable serial, empty when the descriptor has no `serial` key.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// An empty token cannot be opened.
    pub fn is_empty(&self) -> bool {
        self.raw[0] == 0
    }

    /// Short name for log lines: the serial, or the descriptor when there is none.
    pub fn label(&self) -> String {
        if self.serial.is_empty() {
            self.descriptor()
        } else {
            self.serial.clone()
        }
    }
}

impl PartialEq for DeviceId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for DeviceId {}

impl Hash for DeviceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for DeviceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeviceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceId").field(&self.descriptor()).finish()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.descriptor())
    }
}

/// Extract the `serial` value from a comma-separated `key=value` descriptor.
///
/// Tokens are trimmed before matching. Returns an empty string when no
/// token carries the `serial` key.
pub fn parse_serial(descriptor: &str) -> String {
    descriptor
        .split(',')
        .map(str::trim)
        .find_map(|token| token.strip_prefix("serial="))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}
