// crates/nmos-testing-schema/src/lib.rs
// ============================================================================
// Module: NMOS Testing Schema Library
// Description: Schema resolution and response validation.
// Purpose: Decide whether a fetched response is structurally conformant.
// Dependencies: jsonschema, nmos-testing-core, serde_json, url
// ============================================================================

//! ## Overview
//! [`SchemaResolver`] finds and compiles the schema a surface declares for a
//! response. [`ResponseValidator`] applies CORS checks and that schema to an
//! observed response and yields a single outcome. An absent schema is a
//! MANUAL outcome, never a failure.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod resolver;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use jsonschema::Draft;
pub use resolver::SchemaError;
pub use resolver::SchemaHandle;
pub use resolver::SchemaResolver;
pub use validator::ResponseValidator;
pub use validator::check_cors;

#[cfg(test)]
mod tests;
