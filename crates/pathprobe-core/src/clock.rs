//! Session clock — process-relative milliseconds.
//!
//! The clock is anchored to CLOCK_REALTIME at construction. Kernel receive
//! timestamps are reported on the realtime clock, so anchoring there puts
//! locally observed send times and kernel-stamped arrivals on one timeline.

use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel for "no timestamp available".
pub const TIMESTAMP_NONE: u64 = u64::MAX;

/// A millisecond clock counting from the moment it was started.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    base_unix_ms: u64,
}

impl Clock {
    /// Start a clock anchored at the current wall-clock time.
    pub fn start() -> Self {
        Self {
            base_unix_ms: unix_ms(),
        }
    }

    /// Milliseconds elapsed since the clock was started.
    pub fn now_ms(&self) -> u64 {
        unix_ms().saturating_sub(self.base_unix_ms)
    }

    /// Convert a kernel realtime timestamp onto this clock's timeline.
    /// Returns [`TIMESTAMP_NONE`] for a nonsensical (pre-epoch) stamp.
    pub fn from_realtime(&self, secs: i64, nanos: i64) -> u64 {
        if secs < 0 || nanos < 0 {
            return TIMESTAMP_NONE;
        }
        let ms = (secs as u64).saturating_mul(1000) + nanos as u64 / 1_000_000;
        ms.saturating_sub(self.base_unix_ms)
    }

    /// Absolute wall-clock time in unix milliseconds.
    pub fn wall_ms(&self) -> u64 {
        unix_ms()
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
