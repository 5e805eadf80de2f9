//! Datagram transport — blocking UDP send/receive with kernel receive
//! timestamps.
//!
//! The socket is built with socket2, timestamping is enabled with
//! SO_TIMESTAMPNS, and the receive path goes through recvmsg so the kernel
//! stamp can be pulled out of the ancillary data. Receive deadlines are
//! plain SO_RCVTIMEO; an expired deadline surfaces as [`RecvError::Timeout`]
//! and is how the receive loops get cancelled, not an exceptional event.
//!
//! Nothing here retries. Resilience (the repeated end-of-stream marker)
//! belongs to the session layer.

use std::io::IoSliceMut;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::Duration;

use anyhow::Context;
use nix::errno::Errno;
use nix::sys::socket::{self, sockopt, ControlMessageOwned, MsgFlags, SockaddrStorage};
use nix::sys::time::TimeSpec;
use socket2::{Domain, Socket, Type};

use pathprobe_core::{Clock, TIMESTAMP_NONE};

/// Receive buffer size. A datagram that does not fit is a peer bug and is
/// reported as truncation.
pub const RECV_BUFFER_LEN: usize = 65536;

/// One datagram as delivered by the socket layer.
#[derive(Debug)]
pub struct ReceivedDatagram {
    /// Peer endpoint, when the kernel reports one.
    pub source: Option<SocketAddr>,
    /// Kernel receive time on the session clock, or [`TIMESTAMP_NONE`]
    /// when the platform did not supply a stamp.
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("receive deadline elapsed")]
    Timeout,
    #[error("receive interrupted by a signal")]
    Interrupted,
    #[error("datagram truncated to {len} bytes by the receive buffer")]
    Truncated { len: usize },
    #[error("receive failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("short send: {sent} of {len} bytes left the socket")]
    ShortSend { sent: usize, len: usize },
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A UDP socket with receive timestamping enabled, tied to the session
/// clock so kernel stamps land on the session timeline.
pub struct ProbeSocket {
    socket: UdpSocket,
    clock: Clock,
}

impl ProbeSocket {
    /// Bind a timestamp-capable socket on `addr`.
    pub fn bind(addr: SocketAddr, clock: Clock) -> anyhow::Result<Self> {
        let raw = Socket::new(Domain::for_address(addr), Type::DGRAM, None)
            .context("creating UDP socket")?;
        raw.set_reuse_address(true)
            .context("setting SO_REUSEADDR")?;
        raw.set_recv_buffer_size(RECV_BUFFER_LEN)
            .context("setting receive buffer size")?;
        raw.bind(&addr.into())
            .with_context(|| format!("binding to {addr}"))?;

        let socket: UdpSocket = raw.into();
        socket::setsockopt(&socket, sockopt::ReceiveTimestampns, &true)
            .context("enabling SO_TIMESTAMPNS")?;

        tracing::debug!(local = %socket.local_addr()?, "probe socket bound");
        Ok(Self { socket, clock })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Restrict the socket to `peer`. Subsequent sends and receives only
    /// touch that endpoint.
    pub fn connect(&self, peer: SocketAddr) -> std::io::Result<()> {
        self.socket.connect(peer)
    }

    /// Deadline for [`recv`](Self::recv). `None` blocks forever.
    pub fn set_receive_deadline(&self, deadline: Option<Duration>) -> std::io::Result<()> {
        self.socket.set_read_timeout(deadline)
    }

    /// Send one datagram to the connected peer. UDP sends are atomic below
    /// the path MTU, so a partial write is a transport fault, not retried.
    pub fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let sent = self.socket.send(frame)?;
        if sent != frame.len() {
            return Err(TransportError::ShortSend {
                sent,
                len: frame.len(),
            });
        }
        Ok(())
    }

    /// Send one datagram to an explicit address (pre-connect, during the
    /// handshake).
    pub fn send_to(&self, frame: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        let sent = self.socket.send_to(frame, peer)?;
        if sent != frame.len() {
            return Err(TransportError::ShortSend {
                sent,
                len: frame.len(),
            });
        }
        Ok(())
    }

    /// Block until a datagram arrives or the receive deadline elapses,
    /// pulling the kernel receive timestamp out of the ancillary data.
    pub fn recv(&self) -> Result<ReceivedDatagram, RecvError> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        let mut cmsg_space = nix::cmsg_space!(TimeSpec);

        let (len, source, timestamp, truncated) = {
            let mut iov = [IoSliceMut::new(&mut buf)];
            let msg = socket::recvmsg::<SockaddrStorage>(
                self.socket.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_space),
                MsgFlags::empty(),
            )
            .map_err(|errno| match errno {
                Errno::EAGAIN => RecvError::Timeout,
                Errno::EINTR => RecvError::Interrupted,
                other => RecvError::Io(other.into()),
            })?;

            let mut timestamp = TIMESTAMP_NONE;
            let cmsgs = msg.cmsgs().map_err(|e| RecvError::Io(e.into()))?;
            for cmsg in cmsgs {
                if let ControlMessageOwned::ScmTimestampns(stamp) = cmsg {
                    timestamp = self.clock.from_realtime(stamp.tv_sec(), stamp.tv_nsec());
                }
            }

            let source = msg.address.as_ref().and_then(sockaddr_to_std);
            (
                msg.bytes,
                source,
                timestamp,
                msg.flags.contains(MsgFlags::MSG_TRUNC),
            )
        };

        if truncated {
            return Err(RecvError::Truncated { len });
        }

        buf.truncate(len);
        Ok(ReceivedDatagram {
            source,
            timestamp,
            payload: buf,
        })
    }
}

fn sockaddr_to_std(addr: &SockaddrStorage) -> Option<SocketAddr> {
    if let Some(v4) = addr.as_sockaddr_in() {
        Some(SocketAddr::V4(SocketAddrV4::new(v4.ip(), v4.port())))
    } else if let Some(v6) = addr.as_sockaddr_in6() {
        Some(SocketAddr::V6(SocketAddrV6::new(
            v6.ip(),
            v6.port(),
            v6.flowinfo(),
            v6.scope_id(),
        )))
    } else {
        None
    }
}
