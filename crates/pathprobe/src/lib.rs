//! pathprobe — rate-paced UDP path probing.
//!
//! One endpoint paces fixed-size datagrams at a target bit rate while its
//! peer echoes timing acknowledgments; both sides append one CSV record per
//! datagram sent or received. The logs are the product: throughput, one-way
//! and round-trip latency, and loss all fall out of them offline.
//!
//! The protocol is fire-and-log. Loss is observed, never corrected.

pub mod handshake;
pub mod session;
pub mod sink;
pub mod transport;
