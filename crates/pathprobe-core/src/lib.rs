//! pathprobe-core — wire format, session clock, and pacing schedule.
//!
//! Everything in this crate is pure computation over bytes and numbers.
//! Sockets, threads, and files live in the `pathprobe` crate.

pub mod clock;
pub mod schedule;
pub mod wire;

pub use clock::{Clock, TIMESTAMP_NONE};
pub use schedule::{PacingSchedule, ScheduleError};
pub use wire::{Packet, PacketHeader, WireError, ACK_NONE, HEADER_LEN, SEQ_END_OF_STREAM};
