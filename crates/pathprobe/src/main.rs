//! pathprobe binary — argument parsing, role wiring, orderly shutdown.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use pathprobe::handshake;
use pathprobe::session::{self, SessionContext};
use pathprobe::sink::LogSink;
use pathprobe::transport::ProbeSocket;
use pathprobe_core::{Clock, PacingSchedule};

#[derive(Parser)]
#[command(
    name = "pathprobe",
    about = "UDP path probing: paced datagrams, timing acks, one log record per packet"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer to call, then run the selected role.
    Listen {
        /// Local UDP port.
        #[arg(long, default_value_t = 4000)]
        port: u16,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Contact a listening peer, then run the selected role.
    Connect {
        /// Peer address, host:port.
        peer: SocketAddr,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Role for this endpoint.
    #[arg(long, value_enum, default_value = "echo")]
    role: Role,

    /// Measurement log path (CSV, one line per datagram).
    #[arg(long)]
    log: PathBuf,

    /// Target send rate in Mbps (pace role).
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Run duration in seconds (pace role; bound for echo with --bounded).
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Probe payload size in bytes.
    #[arg(long, default_value_t = 1200)]
    payload: usize,

    /// Echo role: stop after --duration even if no end-of-stream arrives.
    #[arg(long)]
    bounded: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    /// Emit data packets on the pacing schedule and drain the acks.
    Pace,
    /// Receive data packets and reply with timing acks.
    Echo,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // The handler only flips the flag; the loops observe it and the main
    // thread does the actual teardown once they return.
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, stop.clone())
            .context("registering shutdown signal handler")?;
    }

    let clock = Clock::start();
    let (socket, peer, run) = match cli.command {
        Command::Listen { port, run } => {
            let socket = ProbeSocket::bind((Ipv4Addr::UNSPECIFIED, port).into(), clock)?;
            let peer = handshake::respond(&socket, &stop)?;
            (socket, peer, run)
        }
        Command::Connect { peer, run } => {
            let bind: SocketAddr = if peer.is_ipv4() {
                (Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = ProbeSocket::bind(bind, clock)?;
            let peer = handshake::initiate(&socket, peer)?;
            (socket, peer, run)
        }
    };

    let sink = LogSink::create(&run.log)?;
    let ctx = Arc::new(SessionContext::new(clock, peer, sink, stop));
    let duration = Duration::from_secs(run.duration);

    match run.role {
        Role::Echo => {
            let bound = run.bounded.then_some(duration);
            session::run_echo(&ctx, &socket, bound)?;
        }
        Role::Pace => {
            let schedule = PacingSchedule::for_rate(run.rate, run.payload)
                .context("computing pacing schedule")?;
            let socket = Arc::new(socket);

            let drain = {
                let ctx = ctx.clone();
                let socket = socket.clone();
                std::thread::spawn(move || session::run_ack_drain(&ctx, &socket))
            };
            let paced = session::run_pacer(&ctx, &socket, schedule, run.payload, duration);

            // Unblock and collect the drain thread even when pacing failed.
            ctx.cancel();
            let drained = drain
                .join()
                .map_err(|_| anyhow::anyhow!("ack drain thread panicked"))?;
            paced?;
            drained?;
        }
    }

    shutdown(&ctx)
}

/// The one place resources are released: flush the measurement log; the
/// socket closes on drop.
fn shutdown(ctx: &SessionContext) -> Result<()> {
    ctx.sink.flush().context("flushing measurement log")?;
    tracing::info!("shutdown complete");
    Ok(())
}
