// crates/nmos-testing-crawler/src/basics.rs
// ============================================================================
// Module: API Root Checks
// Description: Checks of the `/`, `/x-nmos`, and `/x-nmos/<api>` listings.
// Purpose: Confirm an API advertises itself before its surface is crawled.
// Dependencies: nmos-testing-core, nmos-testing-schema, url
// ============================================================================

//! ## Overview
//! Each listing must answer `200` with CORS headers and a JSON array that
//! contains the next path segment (`x-nmos/`, `<api>/`, `<version>/`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use nmos_testing_core::ApiSurface;
use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::TestOutcome;
use nmos_testing_schema::check_cors;
use url::Url;

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Runs the three root listing checks for `api`.
#[must_use]
pub fn api_root_checks(client: &dyn HttpClient, api: &ApiSurface) -> Vec<TestOutcome> {
    let Some(root) = service_root(api.base_url()) else {
        return vec![TestOutcome::fail(
            format!("GET {}", api.base_url()),
            "Base URL cannot be parsed",
        )];
    };
    let api_path = format!("/x-nmos/{}", api.name());
    vec![
        check_base_path(client, &root, "/", "x-nmos/"),
        check_base_path(client, &root, "/x-nmos", &format!("{}/", api.name())),
        check_base_path(client, &root, &api_path, &format!("{}/", api.version())),
    ]
}

/// Checks that `GET root+path` is a JSON array containing `expectation`.
#[must_use]
pub fn check_base_path(
    client: &dyn HttpClient,
    root: &str,
    path: &str,
    expectation: &str,
) -> TestOutcome {
    let name = format!("GET {path}");
    let response = match client.send(&HttpRequest::get(format!("{root}{path}"))) {
        Ok(response) => response,
        Err(err) => return TestOutcome::fail(name, err.to_string()),
    };
    if response.status != 200 {
        return TestOutcome::fail(name, format!("Incorrect response code: {}", response.status));
    }
    if let Err(message) = check_cors(HttpMethod::Get, &response) {
        return TestOutcome::fail(name, message);
    }
    let Ok(body) = response.json() else {
        return TestOutcome::fail(name, "Non-JSON response returned");
    };
    let listed = body
        .as_array()
        .is_some_and(|entries| entries.iter().any(|entry| entry.as_str() == Some(expectation)));
    if listed {
        TestOutcome::pass(name)
    } else {
        TestOutcome::fail(name, format!("Response is not an array containing '{expectation}'"))
    }
}

/// Returns the URL the `/x-nmos` tree hangs from, without a trailing slash.
fn service_root(base_url: &str) -> Option<String> {
    if let Some((prefix, _)) = base_url.split_once("/x-nmos/") {
        return Some(prefix.to_string());
    }
    let url = Url::parse(base_url).ok()?;
    Some(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::service_root;

    #[test]
    fn root_keeps_any_prefix_before_x_nmos() {
        assert_eq!(
            service_root("http://h:8080/proxy/x-nmos/node/v1.2").as_deref(),
            Some("http://h:8080/proxy")
        );
        assert_eq!(
            service_root("http://h:8080/x-nmos/node/v1.2").as_deref(),
            Some("http://h:8080")
        );
        assert_eq!(service_root("https://h/custom").as_deref(), Some("https://h"));
        assert!(service_root("not a url").is_none());
    }
}
