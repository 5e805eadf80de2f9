//! pathprobe integration harness.
//!
//! Tests here drive real sockets over loopback, in-process: both endpoints
//! of a run live in one test body on their own threads, writing to
//! in-memory log sinks the assertions then read back. No root, no
//! namespaces, no spawned binaries.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use pathprobe::session::SessionContext;
use pathprobe::sink::LogSink;
use pathprobe::transport::ProbeSocket;
use pathprobe_core::Clock;

mod probe_session;
mod transport_behavior;

// ── Harness ───────────────────────────────────────────────────────────────────

/// An in-memory log target the test can read back after the run.
#[derive(Clone, Default)]
pub struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .expect("log is not UTF-8")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn loopback_socket(clock: Clock) -> ProbeSocket {
    ProbeSocket::bind("127.0.0.1:0".parse().unwrap(), clock).expect("binding loopback socket")
}

/// A session context writing to a [`CapturedLog`], plus the capture handle.
pub fn captured_context(clock: Clock, peer: SocketAddr) -> (Arc<SessionContext>, CapturedLog) {
    let capture = CapturedLog::default();
    let sink = LogSink::from_writer(Box::new(capture.clone()));
    let ctx = Arc::new(SessionContext::new(
        clock,
        peer,
        sink,
        Arc::new(AtomicBool::new(false)),
    ));
    (ctx, capture)
}

/// Split one CSV record into its numeric fields. `is_ack` comes back as
/// 0/1 like any other field.
pub fn fields(line: &str) -> Vec<u64> {
    line.split(", ")
        .map(|f| f.parse().unwrap_or_else(|_| panic!("bad field in {line:?}")))
        .collect()
}
