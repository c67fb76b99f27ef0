//! End-to-end transfer tests over loopback TCP.
//!
//! Each test spins up two in-process endpoints as separate tokio tasks so
//! both sides make progress concurrently, then checks that whole messages
//! cross intact under the various mode/strategy combinations.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use rdt_over_tcp::{
    Connection, ConnectionEvent, InitiatorConfig, OperationMode, ProtocolError,
    ReliabilityStrategy, ResponderConfig, SessionTable,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn pair(
    client_config: InitiatorConfig,
    server_config: ResponderConfig,
) -> (
    Connection<TcpStream>,
    Connection<TcpStream>,
    Arc<SessionTable>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let table = Arc::new(SessionTable::new());

    let server_table = table.clone();
    let server = tokio::spawn(async move {
        let (socket, peer) = listener.accept().await.expect("accept");
        Connection::accept(socket, server_table, peer.to_string(), server_config)
            .await
            .expect("server handshake")
    });

    let socket = TcpStream::connect(addr).await.expect("connect");
    let client = Connection::connect(socket, client_config)
        .await
        .expect("client handshake");
    let server = server.await.expect("server task");
    (client, server, table)
}

fn burst(strategy: ReliabilityStrategy, window: u16) -> InitiatorConfig {
    InitiatorConfig {
        operation_mode: OperationMode::Burst,
        strategy,
        window_size: window,
        ..InitiatorConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Basic ping-pong in step-by-step mode (stop-and-wait).
#[tokio::test]
async fn step_by_step_ping_pong() {
    let (mut client, mut server, _table) =
        pair(InitiatorConfig::default(), ResponderConfig::default()).await;

    let server_task = tokio::spawn(async move {
        let data = server.receive().await.expect("server receive");
        assert_eq!(data, b"Ping!");
        server.send(b"Pong!").await.expect("server send");
        server
    });

    client.send(b"Ping!").await.expect("client send");
    let reply = client.receive().await.expect("client receive");
    assert_eq!(reply, b"Pong!");

    server_task.await.unwrap();
}

/// A message larger than the negotiated packet size is fragmented, pipelined
/// through the burst window, and reassembled whole.
#[tokio::test]
async fn long_message_fragments_and_reassembles_gbn() {
    let message: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let (mut client, mut server, _table) = pair(
        InitiatorConfig {
            max_packet_size: 8, // forces 125 fragments through a window of 4
            ..burst(ReliabilityStrategy::GoBackN, 4)
        },
        ResponderConfig::default(),
    )
    .await;
    assert_eq!(client.params().max_packet_size, 8);

    let expected = message.clone();
    let server_task = tokio::spawn(async move {
        let data = server.receive().await.expect("server receive");
        assert_eq!(data, expected);
        server
    });

    client.send(&message).await.expect("client send");
    server_task.await.unwrap();
}

/// Same transfer under Selective Repeat.
#[tokio::test]
async fn long_message_fragments_and_reassembles_sr() {
    let message: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let (mut client, mut server, _table) = pair(
        InitiatorConfig {
            max_packet_size: 16,
            ..burst(ReliabilityStrategy::SelectiveRepeat, 8)
        },
        ResponderConfig::default(),
    )
    .await;

    let expected = message.clone();
    let server_task = tokio::spawn(async move {
        let data = server.receive().await.expect("server receive");
        assert_eq!(data, expected);
        server
    });

    client.send(&message).await.expect("client send");
    server_task.await.unwrap();
}

/// Several messages in a row arrive whole, in order, with boundaries kept.
#[tokio::test]
async fn message_boundaries_preserved_across_many_sends() {
    const COUNT: usize = 10;
    let (mut client, mut server, _table) = pair(
        InitiatorConfig {
            max_packet_size: 4,
            ..burst(ReliabilityStrategy::GoBackN, 4)
        },
        ResponderConfig::default(),
    )
    .await;

    let server_task = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..COUNT {
            received.push(server.receive().await.expect("server receive"));
        }
        received
    });

    for i in 0..COUNT {
        let msg = format!("message number {i:02}");
        client.send(msg.as_bytes()).await.expect("send");
    }

    let received = server_task.await.unwrap();
    for (i, msg) in received.iter().enumerate() {
        assert_eq!(msg, format!("message number {i:02}").as_bytes());
    }
}

/// An empty message still crosses as exactly one (empty) message.
#[tokio::test]
async fn empty_message_is_delivered() {
    let (mut client, mut server, _table) =
        pair(InitiatorConfig::default(), ResponderConfig::default()).await;

    let server_task = tokio::spawn(async move {
        let data = server.receive().await.expect("server receive");
        assert!(data.is_empty());
    });

    client.send(b"").await.expect("client send");
    server_task.await.unwrap();
}

/// Traffic flows both directions on one session without interference.
#[tokio::test]
async fn full_duplex_exchange() {
    let (mut client, mut server, _table) = pair(
        burst(ReliabilityStrategy::SelectiveRepeat, 4),
        ResponderConfig::default(),
    )
    .await;

    let server_task = tokio::spawn(async move {
        for _ in 0..5 {
            let data = server.receive().await.expect("server receive");
            let mut echoed = data.clone();
            echoed.extend_from_slice(b" (echo)");
            server.send(&echoed).await.expect("server send");
        }
    });

    for i in 0..5 {
        let msg = format!("round {i}");
        client.send(msg.as_bytes()).await.expect("client send");
        let reply = client.receive().await.expect("client receive");
        assert_eq!(reply, format!("round {i} (echo)").as_bytes());
    }
    server_task.await.unwrap();
}

/// A graceful close surfaces as `ConnectionClosed` on the peer's receive,
/// releases the session-table entry, and emits lifecycle events.
#[tokio::test]
async fn graceful_close_propagates() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (mut client, mut server, table) = pair(
        InitiatorConfig::default(),
        ResponderConfig {
            events: Some(events_tx),
            ..ResponderConfig::default()
        },
    )
    .await;

    assert!(matches!(
        events_rx.recv().await,
        Some(ConnectionEvent::Established { .. })
    ));

    let server_task = tokio::spawn(async move {
        let data = server.receive().await.expect("server receive");
        assert_eq!(data, b"last words");
        let end = server.receive().await;
        assert!(matches!(end, Err(ProtocolError::ConnectionClosed)));
    });

    client.send(b"last words").await.expect("client send");
    client.close().await.expect("client close");
    server_task.await.unwrap();

    assert!(matches!(
        events_rx.recv().await,
        Some(ConnectionEvent::Closed)
    ));
    assert!(table.is_empty());
}

/// Sending after close is a state error, and close is idempotent.
#[tokio::test]
async fn send_after_close_is_rejected() {
    let (mut client, mut server, _table) =
        pair(InitiatorConfig::default(), ResponderConfig::default()).await;

    let server_task = tokio::spawn(async move {
        let _ = server.receive().await; // observes the DISCONNECT
    });

    client.close().await.expect("close");
    client.close().await.expect("close is idempotent");
    assert!(matches!(
        client.send(b"too late").await,
        Err(ProtocolError::BadState(_))
    ));
    server_task.await.unwrap();
}

/// With nothing in flight, a silent peer bounds `receive()` by the idle
/// timeout instead of hanging.
#[tokio::test]
async fn receive_times_out_against_idle_peer() {
    let (mut client, _server, _table) = pair(
        InitiatorConfig {
            idle_timeout: Duration::from_millis(100),
            ..InitiatorConfig::default()
        },
        ResponderConfig::default(),
    )
    .await;

    let start = std::time::Instant::now();
    let result = client.receive().await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
    assert!(start.elapsed() < Duration::from_secs(5));
}
