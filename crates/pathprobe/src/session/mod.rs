//! Session roles — the pacer, its ack-drain receiver, and the echo
//! responder.
//!
//! A run wires exactly one role configuration per endpoint: pace mode runs
//! the pacer and the ack drain as two OS threads over one connected socket;
//! echo mode is a single thread. The only cross-thread signal is the
//! cancellation flag inside [`SessionContext`]; the loops impose no
//! ordering on each other beyond what the network provides.

mod echo;
mod pacer;

pub use echo::run_echo;
pub use pacer::{run_ack_drain, run_pacer};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pathprobe_core::{Clock, Packet, TIMESTAMP_NONE};

use crate::sink::LogSink;
use crate::transport::ReceivedDatagram;

/// How many copies of the end-of-stream marker the pacer flushes. UDP
/// gives no delivery guarantee; repetition only raises the odds the peer
/// observes one, and receivers treat any copy as sufficient. A tunable,
/// not a protocol constant.
pub const END_OF_STREAM_REPEAT: u32 = 5;

/// Receive deadline for the ack-drain loop.
pub const DRAIN_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Filler byte for probe payloads.
pub const FILLER_BYTE: u8 = b'x';

/// Everything the concurrent loops of one run share.
pub struct SessionContext {
    pub clock: Clock,
    pub peer: SocketAddr,
    pub sink: LogSink,
    stop: Arc<AtomicBool>,
}

impl SessionContext {
    /// `stop` is shared with the signal path: an external interrupt sets
    /// it, the loops observe it, and the main thread does the teardown.
    pub fn new(clock: Clock, peer: SocketAddr, sink: LogSink, stop: Arc<AtomicBool>) -> Self {
        Self {
            clock,
            peer,
            sink,
            stop,
        }
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sleep `total`, in short slices so a cancellation is observed
    /// promptly even when the tick interval is long.
    pub fn sleep_cancellable(&self, total: Duration) {
        const SLICE: Duration = Duration::from_millis(250);
        let deadline = Instant::now() + total;
        while !self.cancelled() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return;
            }
            std::thread::sleep(left.min(SLICE));
        }
    }
}

/// When a datagram arrives, the receive time the peer gets told about: the
/// kernel stamp when the platform supplied one, the local clock otherwise.
pub(crate) fn arrival_timestamp(clock: &Clock, datagram: &ReceivedDatagram) -> u64 {
    if datagram.timestamp == TIMESTAMP_NONE {
        clock.now_ms()
    } else {
        datagram.timestamp
    }
}

/// Receiving-side log record: the seven header fields, the arrival time on
/// the session clock, then the absolute wall-clock time of the write.
pub(crate) fn record_received(
    ctx: &SessionContext,
    packet: &Packet,
    arrival: u64,
) -> std::io::Result<()> {
    ctx.sink.record(&format!(
        "{}, {}, {}",
        packet.log_fields(),
        arrival,
        ctx.clock.wall_ms()
    ))
}
