// crates/nmos-testing-config/src/lib.rs
// ============================================================================
// Module: NMOS Testing Config Library
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for nmos-testing.toml semantics.
// Dependencies: nmos-testing-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `nmos-testing-config` defines the configuration model for a conformance
//! run: which APIs to test and where their surface manifests live, the
//! schema root, crawl policy, HTTP limits, and session timings. Validation
//! is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
