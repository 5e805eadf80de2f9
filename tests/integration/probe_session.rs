//! End-to-end runs: handshake, paced stream, echoed acks, both logs.

use std::time::Duration;

use pathprobe::handshake;
use pathprobe::session::{run_ack_drain, run_echo, run_pacer, END_OF_STREAM_REPEAT};
use pathprobe_core::{Clock, PacingSchedule, ACK_NONE};

use crate::{captured_context, fields, loopback_socket};

const PAYLOAD: usize = 1200;

/// A full pace↔echo run over loopback. One endpoint paces for 300 ms at
/// 1 Mbps while draining acks on a second thread; the other echoes until
/// the end-of-stream marker lands. Every contract the logs carry is
/// checked on both sides.
#[test]
fn paced_run_end_to_end() {
    let clock = Clock::start();
    let server = loopback_socket(clock);
    let client = loopback_socket(clock);
    let server_addr = server.local_addr().unwrap();

    let echo_side = std::thread::spawn(move || {
        let peer = {
            let cancelled = std::sync::atomic::AtomicBool::new(false);
            handshake::respond(&server, &cancelled).unwrap()
        };
        let (ctx, capture) = captured_context(clock, peer);
        // The duration bound is a safety net; end-of-stream exits first.
        let received = run_echo(&ctx, &server, Some(Duration::from_secs(10))).unwrap();
        (received, capture)
    });

    let peer = handshake::initiate(&client, server_addr).unwrap();
    let (ctx, capture) = captured_context(clock, peer);
    let client = std::sync::Arc::new(client);

    let drain = {
        let ctx = ctx.clone();
        let client = client.clone();
        std::thread::spawn(move || run_ack_drain(&ctx, &client).unwrap())
    };
    let schedule = PacingSchedule::for_rate(1.0, PAYLOAD).unwrap();
    let sent = run_pacer(&ctx, &client, schedule, PAYLOAD, Duration::from_millis(300)).unwrap();
    let drained = drain.join().unwrap();
    let (echoed, echo_capture) = echo_side.join().unwrap();

    assert!(sent > 0, "pacer sent nothing");

    // Sender side: one 7-field record per data packet and per terminator
    // copy, one 9-field record per drained ack.
    let client_lines = capture.lines();
    let send_records: Vec<_> = client_lines
        .iter()
        .map(|l| fields(l))
        .filter(|f| f.len() == 7)
        .collect();
    let recv_records: Vec<_> = client_lines
        .iter()
        .map(|l| fields(l))
        .filter(|f| f.len() == 9)
        .collect();
    assert_eq!(send_records.len() as u64, sent + END_OF_STREAM_REPEAT as u64);
    assert_eq!(recv_records.len() as u64, drained);
    assert_eq!(drained, sent, "every data packet should come back acked");

    // Data sends count up from 1; the terminator copies all carry seq 0.
    let data_sends: Vec<_> = send_records.iter().filter(|f| f[1] != 0).collect();
    assert_eq!(data_sends.len() as u64, sent);
    assert_eq!(data_sends.first().unwrap()[1], 1);
    assert_eq!(data_sends.last().unwrap()[1], sent);
    assert_eq!(
        send_records.iter().filter(|f| f[1] == 0).count(),
        END_OF_STREAM_REPEAT as usize
    );

    // Drained records are acks of our stream: ack flag set, acked
    // sequence in range, acked payload length echoed back.
    for ack in &recv_records {
        assert_eq!(ack[0], 1, "drained record is not an ack: {ack:?}");
        assert!((1..=sent).contains(&ack[3]), "acked unknown seq: {ack:?}");
        assert_ne!(ack[4], ACK_NONE);
        assert_ne!(ack[5], ACK_NONE);
        assert_eq!(ack[6], PAYLOAD as u64);
    }

    // Echo side: every data packet logged on arrival (9 fields), one ack
    // sent per data packet (7 fields), exactly one terminator observed.
    assert_eq!(echoed, sent + 1);
    let echo_lines = echo_capture.lines();
    let echo_recv: Vec<_> = echo_lines
        .iter()
        .map(|l| fields(l))
        .filter(|f| f.len() == 9)
        .collect();
    let echo_sent: Vec<_> = echo_lines
        .iter()
        .map(|l| fields(l))
        .filter(|f| f.len() == 7)
        .collect();
    assert_eq!(echo_recv.len() as u64, sent + 1);
    assert_eq!(echo_sent.len() as u64, sent);
    assert_eq!(echo_recv.iter().filter(|f| f[1] == 0).count(), 1);

    // Ack sequence numbers are the echo side's own counter, from 1.
    assert_eq!(echo_sent.first().unwrap()[1], 1);
    assert_eq!(echo_sent.last().unwrap()[1], sent);
}

/// The handshake commits both sockets to the addresses actually observed
/// on the wire.
#[test]
fn handshake_discovers_ephemeral_addresses() {
    let clock = Clock::start();
    let server = loopback_socket(clock);
    let client = loopback_socket(clock);
    let server_addr = server.local_addr().unwrap();
    let client_addr = client.local_addr().unwrap();

    let responder = std::thread::spawn(move || {
        let cancelled = std::sync::atomic::AtomicBool::new(false);
        handshake::respond(&server, &cancelled).unwrap()
    });
    let discovered_server = handshake::initiate(&client, server_addr).unwrap();
    let discovered_client = responder.join().unwrap();

    assert_eq!(discovered_server, server_addr);
    assert_eq!(discovered_client, client_addr);
}

/// A duration-bounded echo responder on a silent path exits on its own,
/// having logged nothing.
#[test]
fn bounded_echo_exits_without_traffic() {
    let clock = Clock::start();
    let quiet = loopback_socket(clock);
    let idle = loopback_socket(clock);
    quiet.connect(idle.local_addr().unwrap()).unwrap();

    let (ctx, capture) = captured_context(clock, idle.local_addr().unwrap());
    let started = std::time::Instant::now();
    let received = run_echo(&ctx, &quiet, Some(Duration::from_millis(300))).unwrap();

    assert_eq!(received, 0);
    assert!(capture.lines().is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// The ack drain treats its receive timeout as the exit signal, not an
/// error.
#[test]
fn ack_drain_exits_on_timeout() {
    let clock = Clock::start();
    let quiet = loopback_socket(clock);
    let idle = loopback_socket(clock);
    quiet.connect(idle.local_addr().unwrap()).unwrap();

    let (ctx, _capture) = captured_context(clock, idle.local_addr().unwrap());
    let received = run_ack_drain(&ctx, &quiet).unwrap();
    assert_eq!(received, 0);
}
