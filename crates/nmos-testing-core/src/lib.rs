// crates/nmos-testing-core/src/lib.rs
// ============================================================================
// Module: NMOS Testing Core
// Description: Shared data model and interface seams for the testing engine.
// Purpose: Give every testing crate one vocabulary for outcomes and surfaces.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `nmos-testing-core` defines the types the rest of the engine communicates
//! in: [`TestOutcome`] records, the declared [`ApiSurface`] of each API under
//! test, the run-scoped [`IdentifierCache`], TAI timestamps, and the
//! structured [`RunLog`] sink. It also defines the transport seams
//! ([`HttpClient`], [`SessionConnector`]) so grading logic never depends on a
//! concrete network stack.
//!
//! Invariants:
//! - Outcomes are immutable once produced.
//! - Surfaces are immutable after load.
//! - The identifier cache is append-only within a run.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod interfaces;
pub mod log;
pub mod outcome;
pub mod policy;
pub mod surface;
pub mod timing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::IdentifierCache;
pub use cache::harvest_identifiers;
pub use cache::normalize_collection_key;
pub use interfaces::HttpClient;
pub use interfaces::HttpRequest;
pub use interfaces::HttpResponse;
pub use interfaces::SessionConnector;
pub use interfaces::SessionEnvelope;
pub use interfaces::SessionEvent;
pub use interfaces::SessionKey;
pub use interfaces::SessionLink;
pub use interfaces::TransportError;
pub use log::JsonLineLog;
pub use log::LogLevel;
pub use log::NoopRunLog;
pub use log::RunEvent;
pub use log::RunLog;
pub use outcome::TestOutcome;
pub use outcome::Verdict;
pub use outcome::summarize;
pub use policy::BoundaryStrictness;
pub use policy::ExpansionPolicy;
pub use surface::ApiSurface;
pub use surface::ApiVersion;
pub use surface::HttpMethod;
pub use surface::ParamSpec;
pub use surface::ResourceSpec;
pub use surface::SurfaceError;
pub use surface::SurfaceManifest;
pub use surface::collection_path;
pub use timing::Clock;
pub use timing::SystemClock;
pub use timing::TAI_UTC_OFFSET_SECS;
pub use timing::TaiTimestamp;
pub use timing::TimestampError;
