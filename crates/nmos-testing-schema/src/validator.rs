// crates/nmos-testing-schema/src/validator.rs
// ============================================================================
// Module: Response Validator
// Description: CORS header and JSON schema checks for a fetched response.
// Purpose: Turn one observed response into exactly one outcome.
// Dependencies: nmos-testing-core, serde_json
// ============================================================================

//! ## Overview
//! Validation short-circuits in a fixed order: CORS headers, schema lookup,
//! JSON parsing, schema validation. The validator only reads shared state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpResponse;
use nmos_testing_core::TestOutcome;

use crate::resolver::SchemaResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header every response must carry.
pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
/// Header mutating responses must carry.
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
/// Header mutating responses must carry.
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Validates responses against CORS rules and their declared schema.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    /// Shared schema resolver.
    resolver: Arc<SchemaResolver>,
}

impl ResponseValidator {
    /// Creates a validator backed by `resolver`.
    #[must_use]
    pub const fn new(resolver: Arc<SchemaResolver>) -> Self {
        Self {
            resolver,
        }
    }

    /// Returns the underlying resolver.
    #[must_use]
    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Grades `response` to `method path` on `api`.
    #[must_use]
    pub fn validate(
        &self,
        name: &str,
        api: &ApiSurface,
        method: HttpMethod,
        path: &str,
        response: &HttpResponse,
    ) -> TestOutcome {
        if let Err(message) = check_cors(method, response) {
            return TestOutcome::fail(name, message);
        }
        let handle = match self.resolver.resolve(api, method, path, response.status) {
            Ok(Some(handle)) => handle,
            Ok(None) => return TestOutcome::manual(name, "Test suite unable to locate schema"),
            Err(err) => return TestOutcome::fail(name, format!("Unable to load schema: {err}")),
        };
        let body = match response.json() {
            Ok(body) => body,
            Err(err) => return TestOutcome::fail(name, format!("Invalid JSON received: {err}")),
        };
        let diagnostics = handle.diagnostics(&body);
        if diagnostics.is_empty() {
            TestOutcome::pass(name)
        } else {
            TestOutcome::fail(
                name,
                format!("Response schema validation error: {}", diagnostics.join("; ")),
            )
        }
    }
}

// ============================================================================
// SECTION: CORS
// ============================================================================

/// Checks the CORS headers a response to `method` must carry.
///
/// # Errors
///
/// Returns a failure message naming the missing or incomplete header.
pub fn check_cors(method: HttpMethod, response: &HttpResponse) -> Result<(), String> {
    if response.header(ALLOW_ORIGIN).is_none() {
        return Err(format!("Incorrect CORS headers: missing {ALLOW_ORIGIN}"));
    }
    if !method.requires_extended_cors() {
        return Ok(());
    }
    let Some(allowed_headers) = response.header(ALLOW_HEADERS) else {
        return Err(format!("Incorrect CORS headers: missing {ALLOW_HEADERS}"));
    };
    if !lists_token(allowed_headers, "Content-Type") {
        return Err(format!("Incorrect CORS headers: {ALLOW_HEADERS} does not list Content-Type"));
    }
    let Some(allowed_methods) = response.header(ALLOW_METHODS) else {
        return Err(format!("Incorrect CORS headers: missing {ALLOW_METHODS}"));
    };
    if !lists_token(allowed_methods, method.as_str()) {
        return Err(format!("Incorrect CORS headers: {ALLOW_METHODS} does not list {method}"));
    }
    Ok(())
}

/// Returns true when a comma-separated header value lists `token` or `*`.
fn lists_token(value: &str, token: &str) -> bool {
    value.split(',').map(str::trim).any(|item| item == "*" || item.eq_ignore_ascii_case(token))
}
