// crates/nmos-testing-core/src/policy.rs
// ============================================================================
// Module: Run Policies
// Description: Tunable coverage and strictness policies.
// Purpose: Keep policy choices explicit and configurable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Policies that trade coverage for run time or strictness for jitter
//! tolerance. Both are loaded from configuration.

use serde::Deserialize;
use serde::Serialize;

/// How many harvested identifiers a single-parameter path is tested with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionPolicy {
    /// Test with the first harvested identifier only.
    #[default]
    First,
    /// Test once per distinct harvested identifier.
    All,
}

/// When the kept-alive cohort is asserted open during the timeout boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrictness {
    /// Assert state only when the boundary window ends.
    #[default]
    WindowEnd,
    /// Assert state at every poll within the boundary window.
    EveryPoll,
}
