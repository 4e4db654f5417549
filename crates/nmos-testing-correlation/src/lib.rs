// crates/nmos-testing-correlation/src/lib.rs
// ============================================================================
// Module: NMOS Testing Correlation Library
// Description: Cross-API join model and relational consistency checks.
// Purpose: Assert that independently fetched API views agree with each other.
// Dependencies: nmos-testing-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A run fetches one snapshot of the node, connection, and events APIs with
//! [`SnapshotLoader`] and indexes it into a [`CorrelationModel`]. Records
//! refer to each other through foreign-key fields that are looked up at
//! query time; a dangling or missing key is an ordinary absent value.
//!
//! The event checks in [`checks`] walk sender to flow to source joins and
//! report one outcome each. [`discover_connection_sources`] derives the
//! persistent-connection endpoints the session verifier exercises.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod checks;
pub mod discovery;
pub mod model;
pub mod snapshot;
pub mod topology;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checks::check_ext_params;
pub use checks::check_source_correspondence;
pub use checks::check_websocket_device_consistency;
pub use discovery::ConnectionSources;
pub use discovery::DiscoveryError;
pub use discovery::discover_connection_sources;
pub use model::CorrelationModel;
pub use model::MissingField;
pub use model::ResourceRecord;
pub use model::group_by;
pub use snapshot::SnapshotApis;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotLoader;
pub use topology::EventSender;
pub use topology::event_senders;
