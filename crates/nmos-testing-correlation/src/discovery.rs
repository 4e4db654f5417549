// crates/nmos-testing-correlation/src/discovery.rs
// ============================================================================
// Module: Connection Endpoint Discovery
// Description: Derives persistent-connection endpoints from the snapshot.
// Purpose: Tell the session verifier which URIs to open.
// Dependencies: nmos-testing-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Endpoints come from the WebSocket event senders that serve an events API
//! source. A sender whose active parameters show `master_enable == false` is
//! activated first with an immediate staged PATCH; the staged response
//! replaces its active record in the model. Each distinct `connection_uri`
//! maps to the source ids reachable through it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::LogLevel;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::model::CorrelationModel;
use crate::model::ResourceRecord;
use crate::topology::CONNECTION_ACTIVE;
use crate::topology::EVENT_SOURCES;
use crate::topology::TRANSPORT_WEBSOCKET;
use crate::topology::event_senders;
use crate::topology::first_leg;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Connection URIs mapped to the event source ids they serve.
pub type ConnectionSources = BTreeMap<String, Vec<String>>;

/// Discovery failures; each is reported as a FAIL by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The activation PATCH did not succeed.
    #[error("Activation of sender {sender} failed: {message}")]
    Activation {
        /// Sender id.
        sender: String,
        /// Transport or status detail.
        message: String,
    },
    /// The active parameters carry no usable `connection_uri`.
    #[error("Sender {0} has no connection_uri parameter")]
    MissingConnectionUri(String),
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Collects the WebSocket endpoints of event senders, activating inactive
/// senders through the connection API.
///
/// # Errors
///
/// Returns [`DiscoveryError`] when an activation fails or an active sender
/// lacks a `connection_uri`.
pub fn discover_connection_sources(
    client: &dyn HttpClient,
    connection: &ApiSurface,
    model: &mut CorrelationModel,
    log: &dyn RunLog,
) -> Result<ConnectionSources, DiscoveryError> {
    let mut endpoints = ConnectionSources::new();
    for (sender_id, source_id) in websocket_candidates(model) {
        let enabled = model
            .record(CONNECTION_ACTIVE, &sender_id)
            .and_then(|active| active.get("master_enable"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !enabled {
            let staged = activate(client, connection, &sender_id)?;
            log.record(
                &RunEvent::new("sender_activated", LogLevel::Info, "correlation", &sender_id)
                    .with_api(connection.name()),
            );
            model.index(CONNECTION_ACTIVE, [staged]);
        }
        let uri = model
            .record(CONNECTION_ACTIVE, &sender_id)
            .and_then(first_leg)
            .and_then(|leg| leg.get("connection_uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| DiscoveryError::MissingConnectionUri(sender_id.clone()))?;
        endpoints.entry(uri.to_string()).or_default().push(source_id);
    }
    Ok(endpoints)
}

/// Returns `(sender, source)` pairs for WebSocket event senders that have
/// active parameters, in events API source order.
fn websocket_candidates(model: &CorrelationModel) -> Vec<(String, String)> {
    let senders = event_senders(model);
    let mut candidates = Vec::new();
    for event_source in model.records(EVENT_SOURCES) {
        for entry in senders.iter().filter(|entry| entry.source.id() == event_source.id()) {
            let sender_id = entry.sender.id();
            if entry.sender.get_str("transport") == Some(TRANSPORT_WEBSOCKET)
                && model.contains(CONNECTION_ACTIVE, sender_id)
            {
                candidates.push((sender_id.to_string(), event_source.id().to_string()));
            }
        }
    }
    candidates
}

/// Activates a sender immediately and returns its staged parameters.
fn activate(
    client: &dyn HttpClient,
    connection: &ApiSurface,
    sender_id: &str,
) -> Result<ResourceRecord, DiscoveryError> {
    let failure = |message: String| DiscoveryError::Activation {
        sender: sender_id.to_string(),
        message,
    };
    let request = HttpRequest::new(
        HttpMethod::Patch,
        connection.url_for(&format!("/single/senders/{sender_id}/staged")),
    )
    .with_json(json!({
        "master_enable": true,
        "activation": {"mode": "activate_immediate"}
    }));
    let response = client.send(&request).map_err(|err| failure(err.to_string()))?;
    if response.status != 200 {
        return Err(failure(format!("Incorrect response code: {}", response.status)));
    }
    match response.json() {
        Ok(Value::Object(fields)) => Ok(ResourceRecord::new(sender_id, connection.name(), fields)),
        Ok(_) => Err(failure("staged response is not an object".to_string())),
        Err(err) => Err(failure(format!("Non-JSON response returned: {err}"))),
    }
}
