//! API root listing tests for nmos-testing-crawler.
// crates/nmos-testing-crawler/tests/root_checks.rs
// ============================================================================
// Module: Root Check Tests
// Description: Serve `/`, `/x-nmos`, and `/x-nmos/node` from tiny_http.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::thread;
use std::time::Duration;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::ApiVersion;
use nmos_testing_core::Verdict;
use nmos_testing_crawler::api_root_checks;
use nmos_testing_transport::HttpClientConfig;
use nmos_testing_transport::ReqwestHttpClient;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Serves fixed listings until three requests are answered.
fn serve_listings(node_listing: &'static str, cors: bool) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr().to_string();
    let handle = thread::spawn(move || {
        for _ in 0..3 {
            let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(5)) else {
                return;
            };
            let (status, body) = match request.url() {
                "/" => (200, "[\"x-nmos/\"]"),
                "/x-nmos" => (200, "[\"node/\", \"query/\"]"),
                "/x-nmos/node" => (200, node_listing),
                _ => (404, "[]"),
            };
            let mut response = Response::from_string(body).with_status_code(status);
            if cors {
                let header = Header::from_bytes("Access-Control-Allow-Origin", "*").unwrap();
                response.add_header(header);
            }
            let _ = request.respond(response);
        }
    });
    (addr, handle)
}

fn node_surface(addr: &str) -> ApiSurface {
    let base_url = format!("http://{addr}/x-nmos/node/v1.2");
    ApiSurface::new("node", &base_url, ApiVersion::new(1, 2), Vec::new())
}

#[test]
fn advertised_api_passes_all_root_checks() {
    let (addr, server) = serve_listings("[\"v1.1/\", \"v1.2/\"]", true);
    let client = ReqwestHttpClient::new(&HttpClientConfig::default()).unwrap();
    let outcomes = api_root_checks(&client, &node_surface(&addr));
    server.join().unwrap();

    let names: Vec<&str> = outcomes.iter().map(|outcome| outcome.name.as_str()).collect();
    assert_eq!(names, ["GET /", "GET /x-nmos", "GET /x-nmos/node"]);
    assert!(outcomes.iter().all(|outcome| outcome.verdict == Verdict::Pass), "{outcomes:?}");
}

#[test]
fn missing_version_entry_fails_the_api_listing() {
    let (addr, server) = serve_listings("[\"v1.0/\"]", true);
    let client = ReqwestHttpClient::new(&HttpClientConfig::default()).unwrap();
    let outcomes = api_root_checks(&client, &node_surface(&addr));
    server.join().unwrap();

    assert_eq!(outcomes[0].verdict, Verdict::Pass);
    assert_eq!(outcomes[2].verdict, Verdict::Fail);
    assert_eq!(outcomes[2].message, "Response is not an array containing 'v1.2/'");
}

#[test]
fn missing_cors_header_fails_every_listing() {
    let (addr, server) = serve_listings("[\"v1.2/\"]", false);
    let client = ReqwestHttpClient::new(&HttpClientConfig::default()).unwrap();
    let outcomes = api_root_checks(&client, &node_surface(&addr));
    server.join().unwrap();

    assert!(outcomes.iter().all(|outcome| outcome.verdict == Verdict::Fail));
    assert!(outcomes[0].message.starts_with("Incorrect CORS headers"));
}
