//! The sending side: the pacer and the ack drain that runs beside it.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use pathprobe_core::{Packet, PacingSchedule, SEQ_END_OF_STREAM};

use crate::transport::{ProbeSocket, RecvError};

use super::{
    arrival_timestamp, record_received, SessionContext, DRAIN_RECV_TIMEOUT, END_OF_STREAM_REPEAT,
    FILLER_BYTE,
};

/// Emit data packets on the schedule until `duration` elapses or the run
/// is cancelled, then flood the end-of-stream marker and release the drain
/// thread. Returns the number of data packets sent.
pub fn run_pacer(
    ctx: &SessionContext,
    socket: &ProbeSocket,
    schedule: PacingSchedule,
    payload_len: usize,
    duration: Duration,
) -> Result<u64> {
    tracing::info!(
        peer = %ctx.peer,
        tick_ms = schedule.tick_interval_ms,
        burst = schedule.packets_per_tick,
        payload_len,
        "pacing started"
    );

    let filler = vec![FILLER_BYTE; payload_len];
    let deadline = Instant::now() + duration;
    let mut sequence = 1u64;

    while Instant::now() < deadline && !ctx.cancelled() {
        for _ in 0..schedule.packets_per_tick {
            let packet = Packet::data(sequence, ctx.clock.now_ms(), filler.clone());
            socket
                .send(&packet.encode())
                .context("sending probe packet")?;
            ctx.sink
                .record(&packet.log_fields())
                .context("writing send record")?;
            sequence += 1;
        }
        ctx.sleep_cancellable(schedule.tick());
    }

    let marker = Packet::data(SEQ_END_OF_STREAM, ctx.clock.now_ms(), filler);
    let frame = marker.encode();
    for _ in 0..END_OF_STREAM_REPEAT {
        socket
            .send(&frame)
            .context("sending end-of-stream marker")?;
        ctx.sink
            .record(&marker.log_fields())
            .context("writing send record")?;
    }
    ctx.cancel();

    tracing::info!(packets = sequence - 1, "pacing finished");
    Ok(sequence - 1)
}

/// Runs beside the pacer on the sending side, logging whatever comes back.
/// Exits when the pacer signals completion or when the receive deadline
/// elapses with nothing on the wire; the timeout is the designed exit, not
/// an error. Returns the number of datagrams logged.
pub fn run_ack_drain(ctx: &SessionContext, socket: &ProbeSocket) -> Result<u64> {
    socket
        .set_receive_deadline(Some(DRAIN_RECV_TIMEOUT))
        .context("setting drain receive deadline")?;

    let mut received = 0u64;
    while !ctx.cancelled() {
        let datagram = match socket.recv() {
            Ok(datagram) => datagram,
            Err(RecvError::Timeout) => {
                tracing::debug!("drain deadline elapsed");
                break;
            }
            Err(RecvError::Interrupted) => continue,
            Err(RecvError::Truncated { len }) => {
                tracing::error!(len, "truncated datagram discarded");
                continue;
            }
            Err(RecvError::Io(e)) => return Err(e).context("drain receive failed"),
        };
        let packet = match Packet::decode(&datagram.payload) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable datagram discarded");
                continue;
            }
        };
        let arrival = arrival_timestamp(&ctx.clock, &datagram);
        record_received(ctx, &packet, arrival).context("writing receive record")?;
        received += 1;
    }

    tracing::info!(received, "ack drain finished");
    Ok(received)
}
