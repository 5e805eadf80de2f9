//! Probe wire format — the header every datagram on the measurement path
//! carries.
//!
//! Six unsigned 64-bit fields in network byte order, then the raw payload.
//! The field order and the two sentinels are the interoperability contract;
//! changing anything here breaks mixed-version runs.
//!
//! The header is #[repr(C)] with explicit big-endian fields and uses
//! zerocopy derives for allocation-free serialization. There is no unsafe
//! code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Value of the four ack fields when a packet carries no acknowledgment.
/// A packet is an ack iff its `ack_sequence_number` differs from this.
pub const ACK_NONE: u64 = u64::MAX;

/// Sequence number reserved for the end-of-stream marker.
/// Ordinary data packets count up from 1.
pub const SEQ_END_OF_STREAM: u64 = 0;

/// Wire size of [`PacketHeader`].
pub const HEADER_LEN: usize = 48;

/// The fixed probe header.
///
/// The four `ack_*` fields let an acknowledgment piggyback on a regular
/// packet instead of needing a second message type: the echoing side moves
/// the received sequence number and timestamps into them and sends the
/// packet straight back.
#[derive(Debug, Clone, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct PacketHeader {
    /// Per-sender counter starting at 1. 0 marks the end of the stream.
    pub sequence_number: U64<BigEndian>,

    /// Sender's session clock (ms) at the moment of transmission.
    pub send_timestamp: U64<BigEndian>,

    /// Sequence number of the packet being acknowledged, or [`ACK_NONE`].
    pub ack_sequence_number: U64<BigEndian>,

    /// `send_timestamp` of the acknowledged packet, or [`ACK_NONE`].
    pub ack_send_timestamp: U64<BigEndian>,

    /// Receive time of the acknowledged packet on the acker's clock,
    /// or [`ACK_NONE`].
    pub ack_recv_timestamp: U64<BigEndian>,

    /// Payload length of the acknowledged packet, or [`ACK_NONE`].
    pub ack_payload_length: U64<BigEndian>,
}

// Compile-time wire-size guard. If this fails, the format silently changed.
assert_eq_size!(PacketHeader, [u8; 48]);

impl PacketHeader {
    /// Parse a header from the front of a received buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read_from_prefix(bytes).ok_or(WireError::MalformedPacket { len: bytes.len() })
    }

    pub fn is_ack(&self) -> bool {
        self.ack_sequence_number.get() != ACK_NONE
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.sequence_number.get() == SEQ_END_OF_STREAM
    }
}

/// One datagram on the measurement path: header plus opaque payload.
///
/// A packet is built fresh for every transmission and reconstructed from
/// wire bytes for every reception; [`Packet::acknowledge`] is the only
/// mutation it ever undergoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// A fresh data packet. All four ack fields start at [`ACK_NONE`].
    pub fn data(sequence_number: u64, send_timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            header: PacketHeader {
                sequence_number: U64::new(sequence_number),
                send_timestamp: U64::new(send_timestamp),
                ack_sequence_number: U64::new(ACK_NONE),
                ack_send_timestamp: U64::new(ACK_NONE),
                ack_recv_timestamp: U64::new(ACK_NONE),
                ack_payload_length: U64::new(ACK_NONE),
            },
            payload,
        }
    }

    /// Parse a received datagram. Everything after the header is payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::decode(bytes)?;
        Ok(Self {
            header,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Wire representation: header bytes followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + self.payload.len());
        frame.extend_from_slice(self.header.as_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }

    pub fn is_ack(&self) -> bool {
        self.header.is_ack()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.header.is_end_of_stream()
    }

    /// Turn this received packet into its acknowledgment, in place.
    ///
    /// The received header fields move into the ack slots, the packet gets
    /// a fresh outgoing identity, and the payload is dropped (acks travel
    /// empty). Not reversible.
    pub fn acknowledge(&mut self, sequence_number: u64, recv_timestamp: u64, send_timestamp: u64) {
        let h = &mut self.header;
        h.ack_sequence_number = h.sequence_number;
        h.ack_send_timestamp = h.send_timestamp;
        h.ack_recv_timestamp.set(recv_timestamp);
        h.ack_payload_length.set(self.payload.len() as u64);
        h.sequence_number.set(sequence_number);
        h.send_timestamp.set(send_timestamp);
        self.payload.clear();
    }

    /// The seven fixed CSV fields every measurement-log record starts with:
    /// is_ack, seq, send_ts, ack_seq, ack_send_ts, ack_recv_ts, ack_len.
    pub fn log_fields(&self) -> String {
        let h = &self.header;
        format!(
            "{}, {}, {}, {}, {}, {}, {}",
            self.is_ack() as u8,
            h.sequence_number.get(),
            h.send_timestamp.get(),
            h.ack_sequence_number.get(),
            h.ack_send_timestamp.get(),
            h.ack_recv_timestamp.get(),
            h.ack_payload_length.get(),
        )
    }
}

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram of {len} bytes is too short to contain a {HEADER_LEN}-byte header")]
    MalformedPacket { len: usize },
}
