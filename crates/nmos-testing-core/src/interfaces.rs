// crates/nmos-testing-core/src/interfaces.rs
// ============================================================================
// Module: Interface Seams
// Description: Transport-agnostic HTTP and persistent-session boundaries.
// Purpose: Let grading logic run against real or scripted transports.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! The engine only needs two things from the network: a single HTTP
//! exchange ([`HttpClient`]) and a persistent connection that reports
//! open, message, error, and close signals ([`SessionConnector`]).
//! Transport faults are values ([`TransportError`]), never panics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

use serde_json::Value;
use thiserror::Error;

use crate::surface::HttpMethod;

// ============================================================================
// SECTION: HTTP
// ============================================================================

/// Outbound HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Verb to issue.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Builds a request without a body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    /// Builds a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Observed HTTP response.
///
/// # Invariants
/// - Header names are stored lower-case; repeated headers are joined with
///   `", "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the parser error when the body is not valid JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as lossy UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failures. Always graded as FAIL, never propagated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request timed out.
    #[error("Connection timeout")]
    Timeout,
    /// The redirect limit was exceeded.
    #[error("Too many redirects")]
    TooManyRedirects,
    /// The response body exceeded the configured limit.
    #[error("Response body exceeds size limit")]
    BodyTooLarge,
    /// Any other network failure.
    #[error("{0}")]
    Network(String),
    /// The session is no longer able to carry frames.
    #[error("session closed: {0}")]
    SessionClosed(String),
}

/// Issues one HTTP exchange.
pub trait HttpClient: Send + Sync {
    /// Sends the request and returns the observed response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be observed.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ============================================================================
// SECTION: Persistent Sessions
// ============================================================================

/// Identifies a session within one verifier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey(pub usize);

/// Signals reported by a persistent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connect handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// A transport fault occurred.
    Errored(String),
    /// The connection closed.
    Closed,
}

/// A session event tagged with its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnvelope {
    /// Originating session.
    pub session: SessionKey,
    /// Reported signal.
    pub event: SessionEvent,
}

/// Outbound half of a persistent connection.
pub trait SessionLink: Send {
    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the session can no longer send.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Requests the connection be closed. Idempotent.
    fn close(&self);
}

/// Opens persistent connections.
pub trait SessionConnector: Send + Sync {
    /// Starts connecting to `uri`; every signal for the session is delivered
    /// through `events` tagged with `key`.
    fn connect(
        &self,
        uri: &str,
        key: SessionKey,
        events: Sender<SessionEnvelope>,
    ) -> Box<dyn SessionLink>;
}
