// crates/nmos-testing-transport/src/websocket.rs
// ============================================================================
// Module: WebSocket Connector
// Description: tokio-tungstenite sessions behind the persistent-session seam.
// Purpose: Report open, message, error, and close signals to a sync verifier.
// Dependencies: futures-util, nmos-testing-core, tokio, tokio-tungstenite
// ============================================================================

//! ## Overview
//! [`WebSocketConnector`] owns a small multi-threaded runtime. Each
//! [`SessionConnector::connect`] call spawns one task that performs the
//! handshake under a timeout and then multiplexes inbound frames with
//! outbound commands. Every signal is forwarded, tagged with its
//! [`SessionKey`], on the caller's channel; the task never decides session
//! state itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::SessionEnvelope;
use nmos_testing_core::SessionEvent;
use nmos_testing_core::SessionKey;
use nmos_testing_core::SessionLink;
use nmos_testing_core::TransportError;
use tokio::runtime::Builder;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Opens WebSocket sessions on a dedicated runtime.
pub struct WebSocketConnector {
    /// Runtime driving every session task.
    runtime: Runtime,
    /// Bound on the connect handshake.
    open_timeout: Duration,
    /// Run log sink.
    log: Arc<dyn RunLog>,
}

impl WebSocketConnector {
    /// Creates a connector whose handshakes time out after `open_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the runtime cannot start.
    pub fn new(open_timeout: Duration) -> Result<Self, TransportError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("nmos-ws")
            .enable_all()
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            runtime,
            open_timeout,
            log: Arc::new(NoopRunLog),
        })
    }

    /// Attaches a run log sink.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }
}

impl SessionConnector for WebSocketConnector {
    fn connect(
        &self,
        uri: &str,
        key: SessionKey,
        events: Sender<SessionEnvelope>,
    ) -> Box<dyn SessionLink> {
        let (outbound, commands) = mpsc::unbounded_channel();
        let task = SessionTask {
            uri: uri.to_string(),
            key,
            events,
            open_timeout: self.open_timeout,
            log: Arc::clone(&self.log),
        };
        self.runtime.spawn(task.run(commands));
        Box::new(WebSocketLink {
            outbound,
        })
    }
}

// ============================================================================
// SECTION: Link
// ============================================================================

/// Commands accepted by a session task.
#[derive(Debug)]
enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// Outbound handle for one session task.
struct WebSocketLink {
    /// Command channel into the task.
    outbound: UnboundedSender<Outbound>,
}

impl SessionLink for WebSocketLink {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::SessionClosed("session task has ended".to_string()))
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ============================================================================
// SECTION: Session Task
// ============================================================================

/// State moved into one spawned session task.
struct SessionTask {
    /// Endpoint URI.
    uri: String,
    /// Session tag for emitted signals.
    key: SessionKey,
    /// Signal channel back to the verifier.
    events: Sender<SessionEnvelope>,
    /// Bound on the connect handshake.
    open_timeout: Duration,
    /// Run log sink.
    log: Arc<dyn RunLog>,
}

impl SessionTask {
    /// Connects, then relays frames and commands until the session ends.
    async fn run(self, mut commands: UnboundedReceiver<Outbound>) {
        let connected = tokio::time::timeout(self.open_timeout, connect_async(self.uri.as_str()));
        let stream = match connected.await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => {
                self.fail(err.to_string());
                return;
            }
            Err(_) => {
                self.fail("Connection timeout".to_string());
                return;
            }
        };
        self.emit(SessionEvent::Opened);
        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        self.emit(SessionEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.emit(SessionEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        self.fail(err.to_string());
                        return;
                    }
                },
                command = commands.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(err) = sink.send(Message::text(text)).await {
                            self.fail(err.to_string());
                            return;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        self.emit(SessionEvent::Closed);
                        return;
                    }
                },
            }
        }
    }

    /// Forwards a signal; a dropped receiver means nobody is listening.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(SessionEnvelope {
            session: self.key,
            event,
        });
    }

    /// Logs and forwards a transport fault.
    fn fail(&self, message: String) {
        self.log.record(
            &RunEvent::new("session_error", LogLevel::Warn, "websocket", message.clone())
                .with_url(self.uri.clone())
                .with_session(self.key.0),
        );
        self.emit(SessionEvent::Errored(message));
    }
}
