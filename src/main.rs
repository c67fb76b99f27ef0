//! Entry point for `rdt-over-tcp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing) and the outermost socket
//! loops.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use rdt_over_tcp::channel::{FaultConfig, FaultInjector};
use rdt_over_tcp::handshake::ResponderLimits;
use rdt_over_tcp::stream::FrameStream;
use rdt_over_tcp::{
    Connection, InitiatorConfig, OperationMode, ProtocolError, ReliabilityStrategy,
    ResponderConfig, SessionTable,
};

/// Reliable transfer protocol (GBN / SR) over TCP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, accepting connections and logging received messages.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:5000).
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: String,
        /// Cap on the negotiated per-frame payload size.
        #[arg(long, default_value_t = 1024)]
        max_packet_size: u32,
        /// Cap on the negotiated window size.
        #[arg(long, default_value_t = 16)]
        max_window: u16,
    },
    /// Run as a client: each stdin line is sent as one message.
    Client {
        /// Remote server address (e.g. 127.0.0.1:5000).
        #[arg(short, long)]
        server: String,
        /// Operation mode.
        #[arg(long, value_parser = parse_mode, default_value = "step-by-step")]
        mode: OperationMode,
        /// Retransmission strategy.
        #[arg(long, value_parser = parse_strategy, default_value = "gbn")]
        strategy: ReliabilityStrategy,
        /// Requested per-frame payload size.
        #[arg(long, default_value_t = 1024)]
        max_packet_size: u32,
        /// Requested window size (burst mode).
        #[arg(long, default_value_t = 4)]
        window: u16,
        /// Probability that an outbound frame is dropped.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Probability that an outbound frame is corrupted.
        #[arg(long, default_value_t = 0.0)]
        corruption: f64,
        /// Seed for the fault model.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn parse_mode(s: &str) -> Result<OperationMode, String> {
    match s {
        "step-by-step" => Ok(OperationMode::StepByStep),
        "burst" => Ok(OperationMode::Burst),
        other => Err(format!("unknown mode {other:?} (step-by-step | burst)")),
    }
}

fn parse_strategy(s: &str) -> Result<ReliabilityStrategy, String> {
    match s {
        "gbn" => Ok(ReliabilityStrategy::GoBackN),
        "sr" => Ok(ReliabilityStrategy::SelectiveRepeat),
        other => Err(format!("unknown strategy {other:?} (gbn | sr)")),
    }
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.mode {
        Mode::Server {
            bind,
            max_packet_size,
            max_window,
        } => run_server(&bind, max_packet_size, max_window).await,
        Mode::Client {
            server,
            mode,
            strategy,
            max_packet_size,
            window,
            loss,
            corruption,
            seed,
        } => {
            run_client(
                &server,
                InitiatorConfig {
                    operation_mode: mode,
                    strategy,
                    max_packet_size,
                    window_size: window,
                    ..InitiatorConfig::default()
                },
                FaultConfig {
                    loss_rate: loss,
                    corruption_rate: corruption,
                    seed,
                    ..FaultConfig::default()
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run_server(
    bind: &str,
    max_packet_size: u32,
    max_window: u16,
) -> Result<(), ProtocolError> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("listening on {}", listener.local_addr()?);
    let table = Arc::new(SessionTable::new());

    loop {
        let (socket, addr) = listener.accept().await?;
        log::info!("new connection from {addr}");
        let table = table.clone();
        let config = ResponderConfig {
            limits: ResponderLimits {
                max_packet_size_cap: max_packet_size,
                max_window,
                ..ResponderLimits::default()
            },
            ..ResponderConfig::default()
        };

        tokio::spawn(async move {
            if let Err(e) = serve_peer(socket, table, addr.to_string(), config).await {
                log::warn!("connection with {addr} ended: {e}");
            }
        });
    }
}

/// One connection's lifetime: handshake, then receive until the peer closes.
async fn serve_peer(
    socket: TcpStream,
    table: Arc<SessionTable>,
    peer: String,
    config: ResponderConfig,
) -> Result<(), ProtocolError> {
    let mut conn = Connection::accept(socket, table, peer.clone(), config).await?;
    loop {
        match conn.receive().await {
            Ok(message) => match std::str::from_utf8(&message) {
                Ok(text) => log::info!("[{peer}] message: {text:?}"),
                Err(_) => log::info!("[{peer}] binary message ({} bytes)", message.len()),
            },
            Err(ProtocolError::ConnectionClosed) => {
                log::info!("[{peer}] disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_client(
    server: &str,
    config: InitiatorConfig,
    faults: FaultConfig,
) -> Result<(), ProtocolError> {
    let socket = TcpStream::connect(server).await?;
    let stream = FrameStream::with_injector(socket, FaultInjector::new(faults));
    let mut conn = Connection::connect_via(stream, config).await?;
    log::info!("session {} established", conn.params().session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Enter messages (type 'exit' to quit):");
    while let Some(line) = lines.next_line().await? {
        if line == "exit" {
            break;
        }
        conn.send(line.as_bytes()).await?;
        log::info!("delivered {} byte(s)", line.len());
        // Short delay between interactive sends to avoid flooding.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    conn.close().await?;
    log::info!("disconnected");
    Ok(())
}
