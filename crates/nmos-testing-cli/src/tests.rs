// crates/nmos-testing-cli/src/tests.rs
// ============================================================================
// Module: CLI Library Unit Tests
// Description: Registry order, applicability, config mapping, and reporting.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use std::time::Duration;

use nmos_testing_config::HttpConfig;
use nmos_testing_config::SessionConfig;
use nmos_testing_core::ApiSurface;
use nmos_testing_core::ApiVersion;
use nmos_testing_core::BoundaryStrictness;
use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::HttpResponse;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::ResourceSpec;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::SessionEnvelope;
use nmos_testing_core::SessionKey;
use nmos_testing_core::SessionLink;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::TransportError;
use nmos_testing_core::Verdict;
use nmos_testing_correlation::topology::CONNECTION_SENDERS;
use nmos_testing_correlation::topology::EVENT_SOURCES;
use nmos_testing_correlation::topology::NODE_SENDERS;
use nmos_testing_session::SessionTimings;
use serde_json::Value;
use serde_json::json;

use crate::CrawlSettings;
use crate::OutcomeWriter;
use crate::SuiteContext;
use crate::SuiteError;
use crate::TEST_CASES;
use crate::has_failures;
use crate::http_client_config;
use crate::run_suite;
use crate::session_timings;
use crate::summary_line;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Client for an unreachable IUT.
struct OfflineClient;

impl HttpClient for OfflineClient {
    fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::Network("connection refused".to_string()))
    }
}

/// Client that answers each listing URL only once.
struct OneShotListings {
    /// Bodies keyed by URL.
    routes: BTreeMap<String, Value>,
    /// Listing URLs already answered.
    served: Mutex<BTreeSet<String>>,
}

impl OneShotListings {
    fn new(routes: &[(&str, Value)]) -> Self {
        Self {
            routes: routes.iter().map(|(url, body)| ((*url).to_string(), body.clone())).collect(),
            served: Mutex::new(BTreeSet::new()),
        }
    }
}

impl HttpClient for OneShotListings {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.trim_end_matches('/');
        let Some(body) = self.routes.get(url) else {
            return Ok(HttpResponse {
                status: 404,
                headers: BTreeMap::new(),
                body: Vec::new(),
            });
        };
        if body.is_array() && !self.served.lock().unwrap().insert(url.to_string()) {
            return Err(TransportError::Network("listing already served".to_string()));
        }
        Ok(HttpResponse {
            status: 200,
            headers: BTreeMap::from([("access-control-allow-origin".to_string(), "*".to_string())]),
            body: body.to_string().into_bytes(),
        })
    }
}

/// Connector whose sessions never report anything.
struct SilentConnector;

/// Link that accepts and drops frames.
struct SilentLink;

impl SessionLink for SilentLink {
    fn send_text(&self, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {}
}

impl SessionConnector for SilentConnector {
    fn connect(
        &self,
        _uri: &str,
        _key: SessionKey,
        _events: Sender<SessionEnvelope>,
    ) -> Box<dyn SessionLink> {
        Box::new(SilentLink)
    }
}

fn surface(name: &str, version: ApiVersion) -> ApiSurface {
    ApiSurface::new(name, &format!("http://iut/x-nmos/{name}/{version}"), version, Vec::new())
}

fn context(apis: &[&str]) -> SuiteContext {
    let surfaces: BTreeMap<String, ApiSurface> = apis
        .iter()
        .map(|name| ((*name).to_string(), surface(name, ApiVersion::new(1, 0))))
        .collect();
    SuiteContext {
        client: Arc::new(OfflineClient),
        connector: Arc::new(SilentConnector),
        surfaces,
        cache: IdentifierCache::new(),
        model: None,
        timings: SessionTimings::default(),
        clock: None,
        log: Arc::new(NoopRunLog),
    }
}

fn listing(name: &str, path: &str) -> ApiSurface {
    let version = ApiVersion::new(1, 0);
    let responses = BTreeMap::from([(200, None)]);
    let resources = vec![ResourceSpec::new(path, HttpMethod::Get, responses)];
    ApiSurface::new(name, &format!("http://iut/x-nmos/{name}/{version}"), version, resources)
}

fn verdicts(outcomes: &[TestOutcome]) -> Vec<Verdict> {
    outcomes.iter().map(|outcome| outcome.verdict).collect()
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn registry_order_is_stable() {
    let names: Vec<&str> = TEST_CASES.iter().map(|case| case.name).collect();
    assert_eq!(
        names,
        [
            "ext_params",
            "source_correspondence",
            "websocket_device_consistency",
            "websocket_lifecycle"
        ]
    );
}

#[test]
fn cases_without_their_apis_are_not_applicable() {
    let mut ctx = context(&["node"]);
    let outcomes = run_suite(&mut ctx, &CrawlSettings::default(), None);

    assert_eq!(outcomes.len(), 3 + TEST_CASES.len());
    assert_eq!(verdicts(&outcomes[..3]), [Verdict::Fail; 3]);
    for (outcome, case) in outcomes[3..].iter().zip(TEST_CASES) {
        assert_eq!(outcome.name, case.name);
        assert_eq!(outcome.verdict, Verdict::NotApplicable);
        assert_eq!(outcome.message, "Requires the connection API to be configured");
    }
    assert!(ctx.model.is_none());
}

#[test]
fn selection_limits_registered_cases() {
    let mut ctx = context(&[]);
    let selected = ["websocket_lifecycle".to_string()];
    let outcomes = run_suite(&mut ctx, &CrawlSettings::default(), Some(&selected));
    let names: Vec<&str> = outcomes.iter().map(|outcome| outcome.name.as_str()).collect();
    assert_eq!(names, ["websocket_lifecycle"]);
}

#[test]
fn unreachable_event_apis_leave_cases_inconclusive() {
    let mut ctx = context(&["connection", "events", "node"]);
    let outcomes = run_suite(&mut ctx, &CrawlSettings::default(), None);
    let cases = &outcomes[outcomes.len() - TEST_CASES.len()..];

    assert!(ctx.model.is_some());
    assert_eq!(verdicts(cases), [Verdict::Unclear; 4]);
}

#[test]
fn case_body_without_snapshot_reports_missing_api() {
    let mut ctx = context(&["connection", "events", "node"]);
    let err = (TEST_CASES[0].run)(&mut ctx, "ext_params").unwrap_err();
    assert!(matches!(err, SuiteError::MissingApi("node")));
    assert_eq!(err.to_string(), "API node is not configured");
}

#[test]
fn crawled_identifiers_reach_the_snapshot() {
    let node = "http://iut/x-nmos/node/v1.0";
    let connection = "http://iut/x-nmos/connection/v1.0";
    let events = "http://iut/x-nmos/events/v1.0";
    let client = OneShotListings::new(&[
        (&format!("{node}/senders"), json!([{"id": "s1", "flow_id": "f1"}])),
        (&format!("{node}/senders/s1"), json!({"id": "s1", "flow_id": "f1"})),
        (&format!("{connection}/single/senders"), json!(["s1/"])),
        (&format!("{events}/sources"), json!(["src1/"])),
    ]);
    let mut ctx = context(&[]);
    ctx.client = Arc::new(client);
    ctx.surfaces = BTreeMap::from([
        ("connection".to_string(), listing("connection", "/single/senders")),
        ("events".to_string(), listing("events", "/sources")),
        ("node".to_string(), listing("node", "/senders")),
    ]);

    let selected = ["ext_params".to_string()];
    let _ = run_suite(&mut ctx, &CrawlSettings::default(), Some(&selected));

    assert_eq!(ctx.cache.get("/x-nmos/node/v1.0/senders"), Some(&["s1".to_string()][..]));
    let model = ctx.model.as_ref().unwrap();
    assert_eq!(
        model.record(NODE_SENDERS, "s1").and_then(|sender| sender.get_str("flow_id")),
        Some("f1")
    );
    assert!(model.contains(CONNECTION_SENDERS, "s1"));
    assert!(model.contains(EVENT_SOURCES, "src1"));
}

// ============================================================================
// SECTION: Config Mapping
// ============================================================================

#[test]
fn session_defaults_map_to_protocol_timings() {
    let timings = session_timings(&SessionConfig::default());
    assert_eq!(timings, SessionTimings::default());

    let custom = SessionConfig {
        heartbeat_interval_ms: 100,
        heartbeat_timeout_ms: 240,
        boundary_strictness: BoundaryStrictness::EveryPoll,
        ..SessionConfig::default()
    };
    let timings = session_timings(&custom);
    assert_eq!(timings.heartbeat_interval, Duration::from_millis(100));
    assert_eq!(timings.boundary_end(), Duration::from_millis(340));
    assert_eq!(timings.boundary_strictness, BoundaryStrictness::EveryPoll);
}

#[test]
fn http_section_maps_onto_client_limits() {
    let http = HttpConfig {
        timeout_ms: 750,
        ..HttpConfig::default()
    };
    let client = http_client_config(&http);
    assert_eq!(client.timeout_ms, 750);
    assert_eq!(client.user_agent, http.user_agent);
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

#[test]
fn outcomes_are_written_one_json_object_per_line() {
    let outcomes = [
        TestOutcome::pass("GET /"),
        TestOutcome::warning("corr", "topic differs", "https://example.test/doc"),
    ];
    let mut writer = OutcomeWriter::new(Vec::new());
    writer.write_all(&outcomes).unwrap();
    assert_eq!(writer.written(), 2);

    let text = String::from_utf8(writer.into_inner()).unwrap();
    let parsed: Vec<TestOutcome> =
        text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(parsed, outcomes);
    assert!(text.lines().next().unwrap().contains("\"verdict\":\"PASS\""));
}

#[test]
fn summary_counts_verdicts_in_order() {
    let outcomes = [
        TestOutcome::fail("a", "broken"),
        TestOutcome::pass("b"),
        TestOutcome::pass("c"),
    ];
    assert_eq!(summary_line(&outcomes), "2 PASS, 1 FAIL");
    assert!(has_failures(&outcomes));
    assert!(!has_failures(&outcomes[1..]));
    assert_eq!(summary_line(&[]), "no outcomes");
}
