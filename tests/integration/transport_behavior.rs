//! Transport-level behavior against real sockets.

use std::time::{Duration, Instant};

use pathprobe::transport::RecvError;
use pathprobe_core::{Clock, TIMESTAMP_NONE};

use crate::loopback_socket;

/// A receive loop with a configured deadline must come back with
/// [`RecvError::Timeout`] rather than block indefinitely.
#[test]
fn recv_times_out_on_a_silent_socket() {
    let socket = loopback_socket(Clock::start());
    socket
        .set_receive_deadline(Some(Duration::from_millis(200)))
        .unwrap();

    let started = Instant::now();
    let result = socket.recv();
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(RecvError::Timeout)), "{result:?}");
    assert!(elapsed >= Duration::from_millis(150), "returned too early");
    assert!(elapsed < Duration::from_secs(5), "deadline not honored");
}

/// Loopback datagrams arrive with a kernel receive timestamp and the
/// sender's address.
#[test]
fn recv_carries_kernel_timestamp_and_source() {
    let clock = Clock::start();
    let receiver = loopback_socket(clock);
    let sender = loopback_socket(clock);
    receiver
        .set_receive_deadline(Some(Duration::from_secs(5)))
        .unwrap();

    sender
        .send_to(b"stamp me", receiver.local_addr().unwrap())
        .unwrap();
    let datagram = receiver.recv().unwrap();

    assert_eq!(datagram.payload, b"stamp me");
    assert_eq!(datagram.source, Some(sender.local_addr().unwrap()));
    assert_ne!(
        datagram.timestamp, TIMESTAMP_NONE,
        "kernel did not stamp the datagram"
    );
    // The stamp sits on the session timeline, i.e. close to "now".
    assert!(datagram.timestamp < 60_000);
}

/// Connected sockets ignore datagrams from third parties.
#[test]
fn connect_restricts_the_peer() {
    let clock = Clock::start();
    let receiver = loopback_socket(clock);
    let peer = loopback_socket(clock);
    let stranger = loopback_socket(clock);

    receiver.connect(peer.local_addr().unwrap()).unwrap();
    receiver
        .set_receive_deadline(Some(Duration::from_millis(300)))
        .unwrap();

    stranger
        .send_to(b"not for you", receiver.local_addr().unwrap())
        .unwrap();
    assert!(matches!(receiver.recv(), Err(RecvError::Timeout)));

    peer.send_to(b"expected", receiver.local_addr().unwrap())
        .unwrap();
    let datagram = receiver.recv().unwrap();
    assert_eq!(datagram.payload, b"expected");
}
