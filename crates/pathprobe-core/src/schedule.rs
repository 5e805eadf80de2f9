//! Pacing schedule — converts a target bit rate into a send cadence.
//!
//! The host clock cannot resolve sub-millisecond sleeps, so the schedule
//! has two regimes around the one-packet-per-millisecond line: below it,
//! single packets are spaced out by a longer tick; at or above it, the tick
//! is pinned to 1 ms and multiple packets go out per tick. Collapsing the
//! two branches into one formula changes the achieved rate at both extremes.

use std::time::Duration;

const BITS_PER_BYTE: f64 = 8.0;
const MEGA: f64 = 1024.0 * 1024.0;

/// How a target rate is realized: sleep `tick_interval_ms`, send
/// `packets_per_tick`, repeat. Computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingSchedule {
    pub tick_interval_ms: u64,
    pub packets_per_tick: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("target rate must be a positive, finite number of Mbps, got {0}")]
    InvalidRate(f64),
    #[error("payload length must be non-zero")]
    EmptyPayload,
}

impl PacingSchedule {
    /// Compute the schedule for `target_rate_mbps` megabits per second of
    /// `payload_bytes`-sized packets.
    pub fn for_rate(target_rate_mbps: f64, payload_bytes: usize) -> Result<Self, ScheduleError> {
        if !target_rate_mbps.is_finite() || target_rate_mbps <= 0.0 {
            return Err(ScheduleError::InvalidRate(target_rate_mbps));
        }
        if payload_bytes == 0 {
            return Err(ScheduleError::EmptyPayload);
        }

        let packets_per_ms =
            target_rate_mbps * (MEGA / BITS_PER_BYTE) / (payload_bytes as f64 * 1000.0);

        if packets_per_ms < 1.0 {
            Ok(Self {
                tick_interval_ms: ((1.0 / packets_per_ms).round() as u64).max(1),
                packets_per_tick: 1,
            })
        } else {
            Ok(Self {
                tick_interval_ms: 1,
                packets_per_tick: (packets_per_ms.round() as u64).max(1),
            })
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Effective send rate in packets per millisecond.
    pub fn packets_per_ms(&self) -> f64 {
        self.packets_per_tick as f64 / self.tick_interval_ms as f64
    }
}
