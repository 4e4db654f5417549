// crates/nmos-testing-crawler/src/lib.rs
// ============================================================================
// Module: NMOS Testing Crawler Library
// Description: Declared-surface crawl and API root checks.
// Purpose: Produce structural outcomes and the run's identifier cache.
// Dependencies: nmos-testing-core, nmos-testing-schema, url
// ============================================================================

//! ## Overview
//! [`ResourceCrawler`] requests every declared read endpoint, substituting
//! identifiers it harvested earlier in the run, and hands each response to
//! the [`nmos_testing_schema::ResponseValidator`]. [`api_root_checks`] covers
//! the listing endpoints above each API's version root.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod basics;
pub mod crawler;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use basics::api_root_checks;
pub use basics::check_base_path;
pub use crawler::MULTI_PARAM_MESSAGE;
pub use crawler::NO_RESOURCES_MESSAGE;
pub use crawler::ResourceCrawler;
