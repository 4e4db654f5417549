// crates/nmos-testing-core/src/log.rs
// ============================================================================
// Module: Run Logging
// Description: Structured JSON-lines events emitted while a run executes.
// Purpose: Record what the engine did without coupling to a log backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components record [`RunEvent`]s through the [`RunLog`] trait. The
//! [`JsonLineLog`] sink writes one JSON object per line; [`NoopRunLog`]
//! discards everything. Log write failures are swallowed: logging never
//! changes a verdict.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Severity of a run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained progress.
    Debug,
    /// Normal progress.
    Info,
    /// Degraded but continuing.
    Warn,
    /// A component could not do its job.
    Error,
}

/// Structured run event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    /// Stable event label, e.g. `http_request`.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event severity.
    pub level: LogLevel,
    /// Emitting component, e.g. `crawler`.
    pub component: &'static str,
    /// Free-form detail.
    pub message: String,
    /// API key when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// URL or URI when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Session index when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<usize>,
}

impl RunEvent {
    /// Builds an event stamped with the current time.
    #[must_use]
    pub fn new(
        event: &'static str,
        level: LogLevel,
        component: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event,
            timestamp_ms: now_ms(),
            level,
            component,
            message: message.into(),
            api: None,
            url: None,
            session: None,
        }
    }

    /// Attaches an API key.
    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    /// Attaches a URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attaches a session index.
    #[must_use]
    pub const fn with_session(mut self, session: usize) -> Self {
        self.session = Some(session);
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink for run events.
pub trait RunLog: Send + Sync {
    /// Records an event.
    fn record(&self, event: &RunEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunLog;

impl RunLog for NoopRunLog {
    fn record(&self, _event: &RunEvent) {}
}

/// Sink writing one JSON object per line.
pub struct JsonLineLog<W: Write + Send> {
    /// Output writer for log records.
    writer: Mutex<W>,
    /// Events below this level are dropped.
    min_level: LogLevel,
}

impl<W: Write + Send> JsonLineLog<W> {
    /// Creates a sink recording every level.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level: LogLevel::Debug,
        }
    }

    /// Creates a sink dropping events below `min_level`.
    pub const fn with_min_level(writer: W, min_level: LogLevel) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level,
        }
    }

    /// Returns the underlying writer, or `None` if the lock was poisoned.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

impl<W: Write + Send> RunLog for JsonLineLog<W> {
    fn record(&self, event: &RunEvent) {
        if event.level < self.min_level {
            return;
        }
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *guard, event).is_ok() {
            let _ = guard.write_all(b"\n");
        }
    }
}

/// Returns milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or(0)
}
