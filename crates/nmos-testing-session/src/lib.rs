// crates/nmos-testing-session/src/lib.rs
// ============================================================================
// Module: NMOS Testing Session Library
// Description: Persistent-session lifecycle and heartbeat verification.
// Purpose: Grade the timing contract of event WebSocket endpoints.
// Dependencies: nmos-testing-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SessionLifecycleVerifier`] opens two cohorts of sessions against every
//! endpoint, sends one health command to the kept-alive cohort, and checks
//! which sessions are open at each phase boundary of the timeout window.
//! Sessions are driven through the [`nmos_testing_core::SessionConnector`]
//! seam, so the same script runs against real sockets and scripted fakes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod health;
pub mod session;
pub mod timings;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use health::HealthCommand;
pub use health::HealthError;
pub use health::HealthReply;
pub use health::HealthTiming;
pub use health::check_health_reply;
pub use session::Cohort;
pub use session::ConnectionSession;
pub use session::LifecycleState;
pub use timings::SessionTimings;
pub use verifier::NO_ENDPOINTS_MESSAGE;
pub use verifier::SessionLifecycleVerifier;
