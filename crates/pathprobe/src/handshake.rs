//! Address discovery — a 4-message exchange run before the socket is
//! connected.
//!
//! Either endpoint may sit behind a rendezvous or NAT layer the caller
//! cannot describe, so each side learns the other's ephemeral address from
//! the datagrams themselves: the initiator probes, the responder replies
//! twice (the duplicate absorbs a lost first reply), the initiator
//! acknowledges. Both sides then connect to the address they actually
//! observed. No sequence or timing semantics ride on these messages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::transport::{ProbeSocket, RecvError};

pub const INITIATOR_HELLO: &[u8] = b"Test1\n";
pub const RESPONDER_ACK_FIRST: &[u8] = b"Test1_ACK\n";
pub const RESPONDER_ACK_SECOND: &[u8] = b"Test2_ACK\n";
pub const INITIATOR_ACK: &[u8] = b"Test2_ACK\n";

/// How long the initiator waits for each responder reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive slice used by the responder to notice cancellation while
/// nobody has called yet.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Probe `server`, learn the address its replies come from, and connect
/// the socket to it.
pub fn initiate(socket: &ProbeSocket, server: SocketAddr) -> Result<SocketAddr> {
    tracing::debug!(%server, "initiating handshake");
    socket
        .send_to(INITIATOR_HELLO, server)
        .context("sending handshake hello")?;

    socket.set_receive_deadline(Some(REPLY_TIMEOUT))?;
    let first = socket.recv().context("waiting for first handshake reply")?;
    let second = socket.recv().context("waiting for second handshake reply")?;
    for reply in [&first, &second] {
        if reply.payload != RESPONDER_ACK_FIRST && reply.payload != RESPONDER_ACK_SECOND {
            tracing::warn!(len = reply.payload.len(), "unexpected handshake reply");
        }
    }

    // Commit to where the replies actually came from, not where we aimed.
    let peer = second.source.or(first.source).unwrap_or(server);
    socket
        .send_to(INITIATOR_ACK, peer)
        .context("sending handshake ack")?;
    socket
        .connect(peer)
        .with_context(|| format!("connecting to {peer}"))?;
    socket.set_receive_deadline(None)?;

    tracing::info!(%peer, "handshake complete (initiator)");
    Ok(peer)
}

/// Wait for an initiator, reply twice so it reliably sees our address,
/// collect its final ack, and connect.
pub fn respond(socket: &ProbeSocket, cancelled: &AtomicBool) -> Result<SocketAddr> {
    tracing::info!("waiting for peer");
    socket.set_receive_deadline(Some(WAIT_POLL_INTERVAL))?;
    let hello = loop {
        if cancelled.load(Ordering::Relaxed) {
            bail!("cancelled while waiting for a peer");
        }
        match socket.recv() {
            Ok(datagram) => break datagram,
            Err(RecvError::Timeout) | Err(RecvError::Interrupted) => continue,
            Err(e) => return Err(e).context("waiting for handshake hello"),
        }
    };
    if hello.payload != INITIATOR_HELLO {
        tracing::warn!(len = hello.payload.len(), "unexpected handshake hello");
    }

    let mut peer = hello
        .source
        .context("handshake hello carried no source address")?;
    socket.send_to(RESPONDER_ACK_FIRST, peer)?;
    socket.send_to(RESPONDER_ACK_SECOND, peer)?;

    socket.set_receive_deadline(Some(REPLY_TIMEOUT))?;
    match socket.recv() {
        Ok(ack) => {
            if let Some(source) = ack.source {
                peer = source;
            }
        }
        // The final ack is confirmation, not information; losing it does
        // not change which address we connect to.
        Err(RecvError::Timeout) => tracing::debug!("final handshake ack not observed"),
        Err(e) => return Err(e).context("waiting for final handshake ack"),
    }

    socket
        .connect(peer)
        .with_context(|| format!("connecting to {peer}"))?;
    tracing::info!(%peer, "handshake complete (responder)");
    Ok(peer)
}
