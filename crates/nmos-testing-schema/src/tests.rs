// crates/nmos-testing-schema/src/tests.rs
// ============================================================================
// Module: CORS Check Tests
// Description: Unit tests for header rules applied before schema checks.
// Dependencies: nmos-testing-core
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeMap;

use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpResponse;

use crate::check_cors;

fn response(headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), (*value).to_string()))
            .collect::<BTreeMap<_, _>>(),
        body: b"[]".to_vec(),
    }
}

#[test]
fn get_requires_only_allow_origin() {
    let allowed = response(&[("Access-Control-Allow-Origin", "*")]);
    assert!(check_cors(HttpMethod::Get, &allowed).is_ok());
    let err = check_cors(HttpMethod::Get, &response(&[])).unwrap_err();
    assert!(err.contains("missing Access-Control-Allow-Origin"), "{err}");
}

#[test]
fn post_without_allow_methods_names_the_header() {
    let headers = [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
    ];
    let err = check_cors(HttpMethod::Post, &response(&headers)).unwrap_err();
    assert!(err.contains("missing Access-Control-Allow-Methods"), "{err}");
}

#[test]
fn patch_must_be_listed_in_allow_methods() {
    let headers = [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "content-type, authorization"),
        ("Access-Control-Allow-Methods", "GET, POST"),
    ];
    let err = check_cors(HttpMethod::Patch, &response(&headers)).unwrap_err();
    assert!(err.contains("does not list PATCH"), "{err}");
}

#[test]
fn allow_headers_must_cover_content_type() {
    let headers = [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Authorization"),
        ("Access-Control-Allow-Methods", "PUT"),
    ];
    let err = check_cors(HttpMethod::Put, &response(&headers)).unwrap_err();
    assert!(err.contains("does not list Content-Type"), "{err}");
}

#[test]
fn complete_mutating_headers_pass() {
    let headers = [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "GET, PUT, POST, PATCH, HEAD, OPTIONS, DELETE"),
    ];
    for method in [HttpMethod::Options, HttpMethod::Post, HttpMethod::Delete] {
        assert!(check_cors(method, &response(&headers)).is_ok(), "{method}");
    }
}
