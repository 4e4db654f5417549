// crates/nmos-testing-correlation/src/checks.rs
// ============================================================================
// Module: Event Correlation Checks
// Description: Cross-API consistency checks over event senders and sources.
// Purpose: Grade referential agreement between node, connection, and events.
// Dependencies: nmos-testing-core, serde_json
// ============================================================================

//! ## Overview
//! Each check walks joins over a loaded [`CorrelationModel`] and yields one
//! outcome. The first violation found decides a FAIL and names the record
//! and the field involved. A required key that is absent is a FAIL, never a
//! skip. Broker topic naming is a recommendation, so deviations only warn.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nmos_testing_core::ApiSurface;
use nmos_testing_core::ApiVersion;
use nmos_testing_core::TestOutcome;
use serde_json::Map;
use serde_json::Value;

use crate::model::CorrelationModel;
use crate::model::ResourceRecord;
use crate::model::group_by;
use crate::topology::CONNECTION_ACTIVE;
use crate::topology::CONNECTION_SENDERS;
use crate::topology::EVENT_SOURCES;
use crate::topology::EventSender;
use crate::topology::FORMAT_DATA;
use crate::topology::MEDIA_TYPE_JSON;
use crate::topology::NODE_SOURCES;
use crate::topology::TRANSPORT_MQTT;
use crate::topology::TRANSPORT_WEBSOCKET;
use crate::topology::event_senders;
use crate::topology::first_leg;
use crate::topology::senders_for_source;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message when the snapshot holds nothing to correlate.
pub const NO_RESOURCES_MESSAGE: &str = "Not tested. No resources found.";
/// Message when no event source is carried by a WebSocket sender.
pub const NO_WEBSOCKET_SENDERS_MESSAGE: &str = "Not tested. No WebSocket sender resources found.";

/// Extension parameters a WebSocket event sender must carry, sorted.
const WEBSOCKET_EXT_PARAMS: [&str; 2] = ["ext_is_07_rest_api_url", "ext_is_07_source_id"];
/// Extension parameters an MQTT event sender must carry, sorted.
const MQTT_EXT_PARAMS: [&str; 1] = ["ext_is_07_rest_api_url"];

// ============================================================================
// SECTION: Extension Parameters
// ============================================================================

/// Checks every event sender carries exactly the `ext_` parameters of its
/// transport on its first active leg.
#[must_use]
pub fn check_ext_params(name: &str, model: &CorrelationModel) -> TestOutcome {
    let senders = event_senders(model);
    if senders.is_empty() {
        return TestOutcome::unclear(name, NO_RESOURCES_MESSAGE);
    }
    match senders.iter().try_for_each(|entry| ext_params_conform(model, entry.sender)) {
        Ok(()) => TestOutcome::pass(name),
        Err(message) => TestOutcome::fail(name, message),
    }
}

/// Compares one sender's `ext_` parameter set against its transport's set.
fn ext_params_conform(model: &CorrelationModel, sender: &ResourceRecord) -> Result<(), String> {
    let id = sender.id();
    let (Some(registered), Some(active)) =
        (model.record(CONNECTION_SENDERS, id), model.record(CONNECTION_ACTIVE, id))
    else {
        return Err(format!("Sender {id} not found in Connection API"));
    };
    let transport =
        registered.require_str("transport_type").map_err(|err| format!("Sender {err}"))?;
    let leg = first_leg(active).ok_or_else(|| params_missing(id, "transport_params"))?;
    let expected: &[&str] = match transport {
        TRANSPORT_WEBSOCKET => &WEBSOCKET_EXT_PARAMS,
        TRANSPORT_MQTT => &MQTT_EXT_PARAMS,
        other => return Err(format!("Sender {id} has an unsupported transport {other}")),
    };
    let mut found: Vec<&str> =
        leg.keys().map(String::as_str).filter(|key| key.starts_with("ext_")).collect();
    found.sort_unstable();
    if found == expected {
        Ok(())
    } else {
        Err(format!(
            "Sender {id} ext parameters [{}] do not match the required [{}]",
            found.join(", "),
            expected.join(", ")
        ))
    }
}

// ============================================================================
// SECTION: Source Correspondence
// ============================================================================

/// Checks each events API source against its node API source, flow, and
/// connection API sender.
#[must_use]
pub fn check_source_correspondence(
    name: &str,
    model: &CorrelationModel,
    events: &ApiSurface,
) -> TestOutcome {
    if model.is_empty(EVENT_SOURCES) {
        return TestOutcome::unclear(name, NO_RESOURCES_MESSAGE);
    }
    let senders = event_senders(model);
    let mut warnings = Vec::new();
    for event_source in model.records(EVENT_SOURCES) {
        match source_corresponds(model, &senders, event_source, events.version()) {
            Ok(Some(warning)) => warnings.push(warning),
            Ok(None) => {}
            Err(message) => return TestOutcome::fail(name, message),
        }
    }
    if warnings.is_empty() {
        TestOutcome::pass(name)
    } else {
        TestOutcome::warning(name, warnings.join("; "), broker_topic_link(events.spec_branch()))
    }
}

/// Grades one events API source; `Ok(Some(_))` carries a naming warning.
fn source_corresponds(
    model: &CorrelationModel,
    senders: &[EventSender<'_>],
    event_source: &ResourceRecord,
    events_version: ApiVersion,
) -> Result<Option<String>, String> {
    let source_id = event_source.id();
    let Some(source) = model.record(NODE_SOURCES, source_id) else {
        return Err(format!("Source {source_id} not found in Node API"));
    };
    let format = source.require_str("format").map_err(|err| format!("Source {err}"))?;
    if format != FORMAT_DATA {
        return Err(format!(
            "Source {source_id} specifies an unsupported format in Node API: {format}"
        ));
    }
    let event_type = source.require("event_type").map_err(|err| format!("Source {err}"))?;
    let state_type = event_source
        .require_path(&["state", "event_type"])
        .map_err(|err| format!("Source {err}"))?;
    if event_type != state_type {
        return Err(format!("Source {source_id} specifies a different event_type in Node API"));
    }

    let Some(entry) = senders_for_source(senders, source_id).into_iter().next() else {
        return Err(format!("Source {source_id} has no associated Node API sender"));
    };
    flow_conforms(entry.flow, event_type)?;

    let sender_id = entry.sender.id();
    let Some(active) = model.record(CONNECTION_ACTIVE, sender_id) else {
        return Err(format!("Source {source_id} has no associated Connection API sender"));
    };
    let leg = first_leg(active).ok_or_else(|| params_missing(sender_id, "transport_params"))?;
    let transport = entry.sender.require_str("transport").map_err(|err| format!("Sender {err}"))?;
    match transport {
        TRANSPORT_WEBSOCKET => {
            let declared = leg_param(leg, sender_id, "ext_is_07_source_id")?;
            if declared.as_str() == Some(source_id) {
                Ok(None)
            } else {
                Err(format!(
                    "Connection API sender {sender_id} does not indicate the correct \
                     'ext_is_07_source_id': {source_id}"
                ))
            }
        }
        TRANSPORT_MQTT => {
            let topic = leg_param(leg, sender_id, "broker_topic")?.as_str().unwrap_or_default();
            Ok(broker_topic_warning(sender_id, source_id, topic, events_version))
        }
        other => {
            Err(format!("Connection API sender {sender_id} has an unsupported transport {other}"))
        }
    }
}

/// Checks an event flow's format, media type, and event type.
fn flow_conforms(flow: &ResourceRecord, event_type: &Value) -> Result<(), String> {
    let flow_id = flow.id();
    let format = flow.require_str("format").map_err(|err| format!("Flow {err}"))?;
    if format != FORMAT_DATA {
        return Err(format!("Flow {flow_id} specifies an unsupported format: {format}"));
    }
    let media_type = flow.require_str("media_type").map_err(|err| format!("Flow {err}"))?;
    if media_type != MEDIA_TYPE_JSON {
        return Err(format!("Flow {flow_id} does not specify media_type '{MEDIA_TYPE_JSON}'"));
    }
    if flow.require("event_type").map_err(|err| format!("Flow {err}"))? != event_type {
        return Err(format!("Flow {flow_id} specifies a different event_type to the Source"));
    }
    Ok(())
}

/// Compares an MQTT broker topic with `x-nmos/events/<version>/sources/<id>`.
fn broker_topic_warning(
    sender_id: &str,
    source_id: &str,
    topic: &str,
    version: ApiVersion,
) -> Option<String> {
    let parsed = topic
        .strip_prefix("x-nmos/events/")
        .and_then(|rest| rest.rsplit_once("/sources/"))
        .filter(|(topic_version, topic_source)| {
            !topic_version.is_empty() && !topic_source.is_empty()
        });
    match parsed {
        None => Some(format!(
            "Connection API sender {sender_id} does not follow the recommended convention in \
             'broker_topic': {source_id}"
        )),
        Some((_, topic_source)) if topic_source != source_id => Some(format!(
            "Connection API sender {sender_id} does not indicate the correct source in \
             'broker_topic': {source_id}"
        )),
        Some((topic_version, _)) if topic_version != version.to_string() => Some(format!(
            "Connection API sender {sender_id} does not indicate the correct API version in \
             'broker_topic': {version}"
        )),
        Some(_) => None,
    }
}

/// Reference for the broker topic naming convention.
fn broker_topic_link(spec_branch: &str) -> String {
    format!(
        "https://amwa-tv.github.io/nmos-event-tally/branches/{spec_branch}/docs/\
         5.1._Transport_-_MQTT.html#32-broker_topic"
    )
}

// ============================================================================
// SECTION: Device Consistency
// ============================================================================

/// Checks WebSocket event senders on one device share their connection
/// parameters.
#[must_use]
pub fn check_websocket_device_consistency(name: &str, model: &CorrelationModel) -> TestOutcome {
    if model.is_empty(EVENT_SOURCES) {
        return TestOutcome::unclear(name, NO_RESOURCES_MESSAGE);
    }
    let senders = event_senders(model);
    let websocket: Vec<&ResourceRecord> = model
        .records(EVENT_SOURCES)
        .flat_map(|source| senders_for_source(&senders, source.id()))
        .filter(|entry| entry.sender.get_str("transport") == Some(TRANSPORT_WEBSOCKET))
        .map(|entry| entry.sender)
        .collect();
    if websocket.is_empty() {
        return TestOutcome::unclear(name, NO_WEBSOCKET_SENDERS_MESSAGE);
    }
    let devices = match group_by(websocket, "device_id") {
        Ok(devices) => devices,
        Err(err) => return TestOutcome::fail(name, format!("Sender {err}")),
    };
    for (device_id, members) in &devices {
        if let Err(message) = device_agrees(model, device_id, members) {
            return TestOutcome::fail(name, message);
        }
    }
    TestOutcome::pass(name)
}

/// Requires every member to match the first member's connection parameters.
fn device_agrees(
    model: &CorrelationModel,
    device_id: &str,
    members: &[&ResourceRecord],
) -> Result<(), String> {
    let mut shared: Option<(&Value, &Value)> = None;
    for sender in members {
        let id = sender.id();
        let active = model
            .record(CONNECTION_ACTIVE, id)
            .ok_or_else(|| format!("Sender {id} not found in Connection API"))?;
        let leg = first_leg(active).ok_or_else(|| params_missing(id, "transport_params"))?;
        let uri = leg_param(leg, id, "connection_uri")?;
        let authorization = leg_param(leg, id, "connection_authorization")?;
        match shared {
            None => shared = Some((uri, authorization)),
            Some((device_uri, _)) if device_uri != uri => {
                return Err(format!(
                    "Sender {id} does not have the same connection_uri parameter within device \
                     {device_id}"
                ));
            }
            Some((_, device_authorization)) if device_authorization != authorization => {
                return Err(format!(
                    "Sender {id} does not have the same connection_authorization parameter \
                     within device {device_id}"
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Looks up a transport parameter or names it as missing.
fn leg_param<'a>(
    leg: &'a Map<String, Value>,
    sender_id: &str,
    key: &str,
) -> Result<&'a Value, String> {
    leg.get(key).ok_or_else(|| params_missing(sender_id, key))
}

/// Message for a missing transport parameter.
fn params_missing(sender_id: &str, key: &str) -> String {
    format!("Sender {sender_id} parameters do not contain expected key: {key}")
}
