// crates/nmos-testing-correlation/src/topology.rs
// ============================================================================
// Module: Event Topology
// Description: Collection names, transport labels, and the eligibility join.
// Purpose: Find the senders whose flows carry event sources.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A node-API sender is an event sender when its `flow_id` resolves to a
//! flow, that flow's `source_id` resolves to a source, and the source
//! carries an `event_type`. Only event senders are subject to the event
//! checks and endpoint discovery.

use serde_json::Map;
use serde_json::Value;

use crate::model::CorrelationModel;
use crate::model::ResourceRecord;

// ============================================================================
// SECTION: Collections
// ============================================================================

/// Node API sources.
pub const NODE_SOURCES: &str = "node.sources";
/// Node API flows.
pub const NODE_FLOWS: &str = "node.flows";
/// Node API senders.
pub const NODE_SENDERS: &str = "node.senders";
/// Connection API senders with their `transport_type`.
pub const CONNECTION_SENDERS: &str = "connection.senders";
/// Connection API active parameters keyed by sender id.
pub const CONNECTION_ACTIVE: &str = "connection.active";
/// Events API sources with their `state` and `type`.
pub const EVENT_SOURCES: &str = "events.sources";

// ============================================================================
// SECTION: Labels
// ============================================================================

/// WebSocket transport URN.
pub const TRANSPORT_WEBSOCKET: &str = "urn:x-nmos:transport:websocket";
/// MQTT transport URN.
pub const TRANSPORT_MQTT: &str = "urn:x-nmos:transport:mqtt";
/// RTP transport URN, assumed by connection APIs older than v1.1.
pub const TRANSPORT_RTP: &str = "urn:x-nmos:transport:rtp";
/// Data format URN required of event sources and flows.
pub const FORMAT_DATA: &str = "urn:x-nmos:format:data";
/// Media type required of event flows.
pub const MEDIA_TYPE_JSON: &str = "application/json";

// ============================================================================
// SECTION: Eligibility
// ============================================================================

/// A sender together with the flow and source it resolves to.
#[derive(Debug, Clone, Copy)]
pub struct EventSender<'a> {
    /// Node API sender.
    pub sender: &'a ResourceRecord,
    /// Flow named by the sender's `flow_id`.
    pub flow: &'a ResourceRecord,
    /// Source named by the flow's `source_id`.
    pub source: &'a ResourceRecord,
}

/// Returns every event sender in node API order.
#[must_use]
pub fn event_senders(model: &CorrelationModel) -> Vec<EventSender<'_>> {
    model
        .records(NODE_SENDERS)
        .filter_map(|sender| {
            let flow = model.join_record(sender, "flow_id", NODE_FLOWS)?;
            let source = model.join_record(flow, "source_id", NODE_SOURCES)?;
            source.get("event_type").is_some().then_some(EventSender {
                sender,
                flow,
                source,
            })
        })
        .collect()
}

/// Returns the event senders whose flow references `source_id`.
#[must_use]
pub fn senders_for_source<'a>(
    senders: &[EventSender<'a>],
    source_id: &str,
) -> Vec<EventSender<'a>> {
    senders.iter().filter(|entry| entry.source.id() == source_id).copied().collect()
}

/// Returns the first transport leg of an active-parameters record.
#[must_use]
pub fn first_leg(active: &ResourceRecord) -> Option<&Map<String, Value>> {
    active.get("transport_params")?.as_array()?.first()?.as_object()
}
