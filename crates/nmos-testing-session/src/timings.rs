// crates/nmos-testing-session/src/timings.rs
// ============================================================================
// Module: Session Timings
// Description: Phase durations for the lifecycle script.
// Purpose: Keep protocol constants and jitter tolerances in one value.
// Dependencies: nmos-testing-core
// ============================================================================

//! ## Overview
//! Phase durations for the lifecycle script, keeping protocol constants and
//! jitter tolerances in one value.

use std::time::Duration;

use nmos_testing_core::BoundaryStrictness;

/// Durations that gate each phase, measured from the script start.
///
/// # Invariants
/// - `heartbeat_interval < heartbeat_timeout`.
/// - `pre_timeout_margin < heartbeat_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Interval between health commands (`H`).
    pub heartbeat_interval: Duration,
    /// Silence after which the IUT closes a session (`T`).
    pub heartbeat_timeout: Duration,
    /// Bound on the open phase.
    pub open_timeout: Duration,
    /// Longest single wait between state checks.
    pub poll_interval: Duration,
    /// Gap between the end of the pre-timeout phase and `T`.
    pub pre_timeout_margin: Duration,
    /// When the kept-alive cohort is checked during the boundary phase.
    pub boundary_strictness: BoundaryStrictness,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(12),
            open_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
            pre_timeout_margin: Duration::from_secs(1),
            boundary_strictness: BoundaryStrictness::WindowEnd,
        }
    }
}

impl SessionTimings {
    /// End of the quiescent phase.
    #[must_use]
    pub const fn quiescent_end(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Latest time a health reply is awaited.
    #[must_use]
    pub fn reply_deadline(&self) -> Duration {
        self.heartbeat_interval.saturating_mul(2)
    }

    /// End of the pre-timeout phase.
    #[must_use]
    pub fn pre_timeout_end(&self) -> Duration {
        self.heartbeat_timeout.saturating_sub(self.pre_timeout_margin)
    }

    /// End of the boundary phase.
    #[must_use]
    pub fn boundary_end(&self) -> Duration {
        self.heartbeat_timeout.saturating_add(self.heartbeat_interval)
    }

    /// Latest time the kept-alive cohort may still be open.
    #[must_use]
    pub fn confirmation_end(&self) -> Duration {
        self.boundary_end().saturating_add(self.heartbeat_interval)
    }
}
