//! The echo responder: log every arrival, bounce an ack straight back.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use pathprobe_core::Packet;

use crate::transport::{ProbeSocket, RecvError};

use super::{arrival_timestamp, record_received, SessionContext};

/// Receive slice used to poll the cancellation flag while idle.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receive, log, and acknowledge until the peer's end-of-stream marker
/// arrives, the optional `duration` bound elapses, or the run is
/// cancelled. Returns the number of datagrams logged.
pub fn run_echo(
    ctx: &SessionContext,
    socket: &ProbeSocket,
    duration: Option<Duration>,
) -> Result<u64> {
    socket
        .set_receive_deadline(Some(POLL_INTERVAL))
        .context("setting echo receive deadline")?;

    let started = Instant::now();
    let mut ack_sequence = 1u64;
    let mut received = 0u64;

    loop {
        if ctx.cancelled() {
            break;
        }
        if let Some(limit) = duration {
            if started.elapsed() >= limit {
                tracing::info!(received, "run duration elapsed");
                break;
            }
        }

        let datagram = match socket.recv() {
            Ok(datagram) => datagram,
            Err(RecvError::Timeout) | Err(RecvError::Interrupted) => continue,
            Err(RecvError::Truncated { len }) => {
                tracing::error!(len, "truncated datagram discarded");
                continue;
            }
            Err(RecvError::Io(e)) => return Err(e).context("echo receive failed"),
        };
        let mut packet = match Packet::decode(&datagram.payload) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable datagram discarded");
                continue;
            }
        };

        let arrival = arrival_timestamp(&ctx.clock, &datagram);
        record_received(ctx, &packet, arrival).context("writing receive record")?;
        received += 1;

        // Any copy of the terminator ends the stream; duplicates land in
        // the log and are ignored by whoever reads it.
        if packet.is_end_of_stream() {
            tracing::info!(received, "end of stream from peer");
            break;
        }

        packet.acknowledge(ack_sequence, arrival, ctx.clock.now_ms());
        ack_sequence += 1;
        socket.send(&packet.encode()).context("sending ack")?;
        ctx.sink
            .record(&packet.log_fields())
            .context("writing send record")?;
    }

    Ok(received)
}
