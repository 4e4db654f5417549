//! End-to-end suite tests for nmos-testing-cli.
// crates/nmos-testing-cli/tests/run_suite.rs
// ============================================================================
// Module: Suite Run Tests
// Description: Load a config from disk and run the suite against tiny_http.
// Purpose: Cover config resolution, schema roots, and outcome ordering.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nmos_testing_cli::CrawlSettings;
use nmos_testing_cli::SuiteContext;
use nmos_testing_cli::http_client_config;
use nmos_testing_cli::run_suite;
use nmos_testing_cli::session_timings;
use nmos_testing_config::TestingConfig;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::Verdict;
use nmos_testing_transport::ReqwestHttpClient;
use nmos_testing_transport::WebSocketConnector;
use serde_json::json;
use tempfile::TempDir;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Serves a node API at v1.3 until idle for half a second.
fn spawn_node(sender: serde_json::Value) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr().to_string();
    let handle = thread::spawn(move || {
        while let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(500)) {
            let (status, body) = match request.url() {
                "/" => (200, json!(["x-nmos/"])),
                "/x-nmos" => (200, json!(["node/"])),
                "/x-nmos/node" => (200, json!(["v1.3/"])),
                "/x-nmos/node/v1.3/senders" => (200, json!([{"id": "s1"}])),
                "/x-nmos/node/v1.3/senders/s1" => (200, sender.clone()),
                _ => (404, json!({"code": 404})),
            };
            let response = Response::from_string(body.to_string())
                .with_status_code(status)
                .with_header(Header::from_bytes("Access-Control-Allow-Origin", "*").unwrap());
            let _ = request.respond(response);
        }
    });
    (addr, handle)
}

/// Writes config, manifest and schemas; returns the config path.
fn write_workspace(dir: &Path, addr: &str) -> std::path::PathBuf {
    let manifest = json!({
        "resources": [
            {"path": "/senders", "method": "GET", "responses": {"200": "senders.json"}},
            {
                "path": "/senders/{senderId}",
                "method": "GET",
                "responses": {"200": "sender.json", "404": null}
            },
            {"path": "/receivers/{receiverId}", "method": "GET", "responses": {"200": null}}
        ]
    });
    fs::write(dir.join("node.json"), manifest.to_string()).unwrap();
    fs::create_dir(dir.join("schemas")).unwrap();
    fs::write(dir.join("schemas/senders.json"), json!({"type": "array"}).to_string()).unwrap();
    let sender = json!({
        "type": "object",
        "required": ["id", "flow_id"],
        "properties": {"id": {"type": "string"}}
    });
    fs::write(dir.join("schemas/sender.json"), sender.to_string()).unwrap();
    let config = format!(
        r#"
[apis.node]
base_url = "http://{addr}/x-nmos/node/v1.3/"
version = "v1.3"
surface = "node.json"

[schemas]
root = "schemas"

[session]
heartbeat_interval_ms = 100
heartbeat_timeout_ms = 240
poll_interval_ms = 10
pre_timeout_margin_ms = 50
"#
    );
    let path = dir.join("nmos-testing.toml");
    fs::write(&path, config).unwrap();
    path
}

fn run(sender: serde_json::Value) -> Vec<TestOutcome> {
    let (addr, server) = spawn_node(sender);
    let dir = TempDir::new().unwrap();
    let path = write_workspace(dir.path(), &addr);
    let config = TestingConfig::load(Some(&path)).unwrap();
    let timings = session_timings(&config.session);
    let mut ctx = SuiteContext {
        client: Arc::new(ReqwestHttpClient::new(&http_client_config(&config.http)).unwrap()),
        connector: Arc::new(WebSocketConnector::new(timings.open_timeout).unwrap()),
        surfaces: config.load_surfaces().unwrap(),
        cache: IdentifierCache::new(),
        model: None,
        timings,
        clock: None,
        log: Arc::new(NoopRunLog),
    };
    let crawl = CrawlSettings {
        schema_root: config.schema_root(),
        expansion: config.crawler.expansion,
        omit_paths: config.crawler.omit_paths.clone(),
    };
    let outcomes = run_suite(&mut ctx, &crawl, None);
    server.join().unwrap();
    outcomes
}

fn find<'a>(outcomes: &'a [TestOutcome], name: &str) -> &'a TestOutcome {
    outcomes.iter().find(|outcome| outcome.name == name).unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn conforming_node_api_runs_in_order() {
    let outcomes = run(json!({"id": "s1", "flow_id": "f1"}));
    let summary: Vec<(&str, Verdict)> =
        outcomes.iter().map(|outcome| (outcome.name.as_str(), outcome.verdict)).collect();
    assert_eq!(
        summary,
        [
            ("GET /", Verdict::Pass),
            ("GET /x-nmos", Verdict::Pass),
            ("GET /x-nmos/node", Verdict::Pass),
            ("GET /x-nmos/node/v1.3/senders", Verdict::Pass),
            ("GET /x-nmos/node/v1.3/senders/s1", Verdict::Pass),
            ("GET /x-nmos/node/v1.3/receivers/{receiverId}", Verdict::NotApplicable),
            ("ext_params", Verdict::NotApplicable),
            ("source_correspondence", Verdict::NotApplicable),
            ("websocket_device_consistency", Verdict::NotApplicable),
            ("websocket_lifecycle", Verdict::NotApplicable),
        ]
    );
}

#[test]
fn schema_violation_is_reported_against_the_concrete_path() {
    let outcomes = run(json!({"id": "s1"}));
    let sender = find(&outcomes, "GET /x-nmos/node/v1.3/senders/s1");
    assert_eq!(sender.verdict, Verdict::Fail);
    assert!(sender.message.contains("flow_id"), "{}", sender.message);
    assert_eq!(find(&outcomes, "GET /x-nmos/node/v1.3/senders").verdict, Verdict::Pass);
}
