// crates/nmos-testing-session/src/health.rs
// ============================================================================
// Module: Health Messages
// Description: Health command payloads and reply validation.
// Purpose: Check a reply echoes the command timestamp and postdates it.
// Dependencies: nmos-testing-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A health command carries a TAI timestamp. A conforming reply has
//! `message_type == "health"`, echoes that timestamp as
//! `timing.origin_timestamp`, and carries a `timing.creation_timestamp`
//! strictly later than it. Each missing or wrong part has its own error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nmos_testing_core::TaiTimestamp;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Command sent to the kept-alive cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCommand {
    /// Always `health`.
    pub command: &'static str,
    /// TAI send time as `<secs>:<nanos>`.
    pub timestamp: String,
}

impl HealthCommand {
    /// Builds a command stamped with `timestamp`.
    #[must_use]
    pub fn new(timestamp: TaiTimestamp) -> Self {
        Self {
            command: "health",
            timestamp: timestamp.to_string(),
        }
    }
}

/// Reply fields the check reads; anything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthReply {
    /// Expected to be `health`.
    #[serde(default)]
    pub message_type: Option<String>,
    /// Timing block.
    #[serde(default)]
    pub timing: Option<HealthTiming>,
}

/// Reply timing block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthTiming {
    /// Echo of the command timestamp.
    #[serde(default)]
    pub origin_timestamp: Option<String>,
    /// Time the reply was created.
    #[serde(default)]
    pub creation_timestamp: Option<String>,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Ways a health reply can be wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// Not JSON, or not an object of the expected shape.
    #[error("health response cannot be parsed: {0}")]
    Unparseable(String),
    /// `message_type` absent.
    #[error("health response does not have a message_type")]
    MissingMessageType,
    /// `message_type` is not `health`.
    #[error("health response message_type is not set to health but instead is {0}")]
    WrongMessageType(String),
    /// `timing` absent.
    #[error("health response does not have a timing object")]
    MissingTiming,
    /// `timing.origin_timestamp` absent.
    #[error("health response does not have origin_timestamp")]
    MissingOrigin,
    /// `timing.origin_timestamp` differs from the command timestamp.
    #[error(
        "health response origin_timestamp is not set to the original timestamp but instead is {0}"
    )]
    OriginMismatch(String),
    /// `timing.creation_timestamp` absent.
    #[error("health response does not have creation_timestamp")]
    MissingCreation,
    /// `timing.creation_timestamp` is malformed or not after the origin.
    #[error("health response creation_timestamp expected to be later than origin, was {0}")]
    CreationNotLater(String),
}

/// Validates a reply text against the command timestamp `sent`.
///
/// # Errors
///
/// Returns the first [`HealthError`] the reply exhibits.
pub fn check_health_reply(text: &str, sent: TaiTimestamp) -> Result<(), HealthError> {
    let reply: HealthReply =
        serde_json::from_str(text).map_err(|err| HealthError::Unparseable(err.to_string()))?;
    match reply.message_type.as_deref() {
        None => return Err(HealthError::MissingMessageType),
        Some("health") => {}
        Some(other) => return Err(HealthError::WrongMessageType(other.to_string())),
    }
    let timing = reply.timing.ok_or(HealthError::MissingTiming)?;
    let origin = timing.origin_timestamp.ok_or(HealthError::MissingOrigin)?;
    if origin != sent.to_string() {
        return Err(HealthError::OriginMismatch(origin));
    }
    let creation = timing.creation_timestamp.ok_or(HealthError::MissingCreation)?;
    match creation.parse::<TaiTimestamp>() {
        Ok(created) if created > sent => Ok(()),
        _ => Err(HealthError::CreationNotLater(creation)),
    }
}
