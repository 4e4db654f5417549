// crates/nmos-testing-session/src/session.rs
// ============================================================================
// Module: Connection Sessions
// Description: Per-connection lifecycle state and received-message queue.
// Purpose: Fold transport signals into a state the verifier can assert on.
// Dependencies: nmos-testing-core
// ============================================================================

//! ## Overview
//! A session starts `Connecting`, becomes `Open` once the handshake
//! completes, and ends `Closed` or `Errored`. Terminal states absorb every
//! later signal. A close before the handshake completes counts as an error.
//! Only the verifier applies signals, so each session has one mutator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Instant;

use nmos_testing_core::SessionEvent;
use nmos_testing_core::SessionLink;

// ============================================================================
// SECTION: State
// ============================================================================

/// Lifecycle of one persistent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Handshake in progress.
    Connecting,
    /// Handshake completed.
    Open,
    /// Closed by either side.
    Closed,
    /// Faulted, with the transport's description.
    Errored(String),
}

impl LifecycleState {
    /// Returns true for `Closed` and `Errored`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }

    /// Returns the state after `event`.
    #[must_use]
    pub fn next(&self, event: &SessionEvent) -> Self {
        match (self, event) {
            (Self::Closed | Self::Errored(_), _) => self.clone(),
            (Self::Connecting, SessionEvent::Opened) => Self::Open,
            (_, SessionEvent::Errored(message)) => Self::Errored(message.clone()),
            (Self::Connecting, SessionEvent::Closed) => {
                Self::Errored("connection closed during handshake".to_string())
            }
            (Self::Open, SessionEvent::Closed) => Self::Closed,
            (state, SessionEvent::Opened | SessionEvent::Message(_)) => state.clone(),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("CONNECTING"),
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
            Self::Errored(_) => f.write_str("ERRORED"),
        }
    }
}

/// Which half of the script a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    /// Sent one health command; expected to outlive the timeout.
    KeptAlive,
    /// Never sent a health command; expected to time out.
    NotKeptAlive,
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One opened connection and what has been observed on it.
pub struct ConnectionSession {
    /// Endpoint URI.
    uri: String,
    /// Script cohort.
    cohort: Cohort,
    /// Outbound half of the connection.
    link: Box<dyn SessionLink>,
    /// Current lifecycle state.
    state: LifecycleState,
    /// Text frames received while open, oldest first.
    messages: Vec<String>,
    /// When the session became open.
    opened_at: Option<Instant>,
}

impl ConnectionSession {
    /// Wraps a freshly started connection.
    #[must_use]
    pub fn new(uri: impl Into<String>, cohort: Cohort, link: Box<dyn SessionLink>) -> Self {
        Self {
            uri: uri.into(),
            cohort,
            link,
            state: LifecycleState::Connecting,
            messages: Vec::new(),
            opened_at: None,
        }
    }

    /// Folds a transport signal into the session.
    ///
    /// Returns true when the lifecycle state changed.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        let next = self.state.next(&event);
        if let SessionEvent::Message(text) = event
            && self.state == LifecycleState::Open
        {
            self.messages.push(text);
        }
        if next == self.state {
            return false;
        }
        if next == LifecycleState::Open {
            self.opened_at = Some(Instant::now());
        }
        self.state = next;
        true
    }

    /// Returns the endpoint URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the script cohort.
    #[must_use]
    pub const fn cohort(&self) -> Cohort {
        self.cohort
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Returns true while the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == LifecycleState::Open
    }

    /// Returns the frames received while open.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Discards queued frames.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Returns when the session opened.
    #[must_use]
    pub const fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Returns the outbound half.
    #[must_use]
    pub fn link(&self) -> &dyn SessionLink {
        self.link.as_ref()
    }
}
