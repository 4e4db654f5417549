// crates/nmos-testing-cli/src/lib.rs
// ============================================================================
// Module: NMOS Testing CLI Library
// Description: Test-case registry, suite runner, and outcome reporting.
// Purpose: Keep the binary a thin dispatcher over testable suite logic.
// Dependencies: nmos-testing-*, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A run crawls every configured API, loads the cross-API snapshot when the
//! node, connection and events APIs are all configured, then executes the
//! statically declared [`TEST_CASES`] in order. Each case yields exactly one
//! outcome; a case that returns an error is reported as a FAIL and the run
//! continues.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod report;
pub mod suite;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use report::OutcomeWriter;
pub use report::has_failures;
pub use report::summary_line;
pub use suite::CrawlSettings;
pub use suite::SuiteContext;
pub use suite::SuiteError;
pub use suite::TEST_CASES;
pub use suite::TestCase;
pub use suite::http_client_config;
pub use suite::run_suite;
pub use suite::session_timings;

#[cfg(test)]
mod tests;
