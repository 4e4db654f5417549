//! WebSocket connector tests for nmos-testing-transport.
// crates/nmos-testing-transport/tests/websocket_connector.rs
// ============================================================================
// Module: WebSocketConnector Tests
// Description: Drive sessions against an in-process tokio-tungstenite server.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::SessionEnvelope;
use nmos_testing_core::SessionEvent;
use nmos_testing_core::SessionKey;
use nmos_testing_transport::WebSocketConnector;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Starts a server that answers one text frame with `echo:<text>` then closes.
fn spawn_echo_server() -> (SocketAddr, thread::JoinHandle<()>) {
    let (addr_tx, addr_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Text(text) = message {
                    let reply = format!("echo:{}", text.as_str());
                    socket.send(Message::text(reply)).await.unwrap();
                    let _ = socket.close(None).await;
                    break;
                }
            }
        });
    });
    (addr_rx.recv().unwrap(), handle)
}

fn next_event(events: &mpsc::Receiver<SessionEnvelope>) -> SessionEvent {
    events.recv_timeout(Duration::from_secs(5)).expect("session event").event
}

#[test]
fn session_reports_open_message_and_close() {
    let (addr, server) = spawn_echo_server();
    let connector = WebSocketConnector::new(Duration::from_secs(2)).unwrap();
    let (tx, rx) = mpsc::channel();
    let link = connector.connect(&format!("ws://{addr}"), SessionKey(7), tx);
    link.send_text("hello").unwrap();

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.session, SessionKey(7));
    assert_eq!(first.event, SessionEvent::Opened);
    assert_eq!(next_event(&rx), SessionEvent::Message("echo:hello".to_string()));
    assert_eq!(next_event(&rx), SessionEvent::Closed);
    server.join().unwrap();
}

#[test]
fn refused_endpoint_reports_error_without_opening() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WebSocketConnector::new(Duration::from_secs(1)).unwrap();
    let (tx, rx) = mpsc::channel();
    let _link = connector.connect(&format!("ws://{addr}"), SessionKey(0), tx);
    match next_event(&rx) {
        SessionEvent::Errored(_) => {}
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn local_close_is_reported_and_link_stops_sending() {
    let (addr, server) = spawn_echo_server();
    let connector = WebSocketConnector::new(Duration::from_secs(2)).unwrap();
    let (tx, rx) = mpsc::channel();
    let link = connector.connect(&format!("ws://{addr}"), SessionKey(1), tx);
    assert_eq!(next_event(&rx), SessionEvent::Opened);
    link.close();
    assert_eq!(next_event(&rx), SessionEvent::Closed);
    thread::sleep(Duration::from_millis(50));
    assert!(link.send_text("late").is_err());
    server.join().unwrap();
}
