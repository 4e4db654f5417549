// crates/nmos-testing-cli/src/suite.rs
// ============================================================================
// Module: Suite Runner
// Description: Ordered registry of correlation and session test cases.
// Purpose: Turn a validated config into one ordered list of outcomes.
// Dependencies: nmos-testing-*, thiserror
// ============================================================================

//! ## Overview
//! Outcomes are produced in a fixed order: API root checks per API, then the
//! resource crawl, then each registered [`TestCase`]. A case whose APIs are
//! not all configured reports NOT_APPLICABLE instead of running.
//!
//! The crawl's identifier cache is kept on the context and seeds the
//! correlation snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nmos_testing_config::HttpConfig;
use nmos_testing_config::SessionConfig;
use nmos_testing_core::ApiSurface;
use nmos_testing_core::Clock;
use nmos_testing_core::ExpansionPolicy;
use nmos_testing_core::HttpClient;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::LogLevel;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::TestOutcome;
use nmos_testing_correlation::CorrelationModel;
use nmos_testing_correlation::DiscoveryError;
use nmos_testing_correlation::SnapshotApis;
use nmos_testing_correlation::SnapshotLoader;
use nmos_testing_correlation::check_ext_params;
use nmos_testing_correlation::check_source_correspondence;
use nmos_testing_correlation::check_websocket_device_consistency;
use nmos_testing_correlation::discover_connection_sources;
use nmos_testing_crawler::ResourceCrawler;
use nmos_testing_crawler::api_root_checks;
use nmos_testing_schema::ResponseValidator;
use nmos_testing_schema::SchemaResolver;
use nmos_testing_session::SessionLifecycleVerifier;
use nmos_testing_session::SessionTimings;
use nmos_testing_transport::HttpClientConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Config key of the node API.
pub const NODE_API: &str = "node";
/// Config key of the connection API.
pub const CONNECTION_API: &str = "connection";
/// Config key of the events API.
pub const EVENTS_API: &str = "events";

/// APIs every registered case reads.
const EVENT_APIS: &[&str] = &[NODE_API, CONNECTION_API, EVENTS_API];

/// Component label for run events.
const COMPONENT: &str = "suite";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures inside a test case body.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// A required API is not configured, or its snapshot is unavailable.
    #[error("API {0} is not configured")]
    MissingApi(&'static str),
    /// Endpoint discovery failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Everything a test case may read or use during a run.
pub struct SuiteContext {
    /// HTTP transport.
    pub client: Arc<dyn HttpClient>,
    /// Persistent-session transport.
    pub connector: Arc<dyn SessionConnector>,
    /// Surfaces keyed by config API key.
    pub surfaces: BTreeMap<String, ApiSurface>,
    /// Identifiers harvested by the crawl; empty until `run_suite` crawls.
    pub cache: IdentifierCache,
    /// Cross-API snapshot, present once loaded.
    pub model: Option<CorrelationModel>,
    /// Lifecycle phase durations.
    pub timings: SessionTimings,
    /// Clock for health command stamps; system clock when absent.
    pub clock: Option<Arc<dyn Clock>>,
    /// Run event sink.
    pub log: Arc<dyn RunLog>,
}

impl SuiteContext {
    /// Returns true when every API in `keys` is configured.
    #[must_use]
    pub fn configures(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.surfaces.contains_key(*key))
    }

    /// Returns a configured surface.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::MissingApi`] when `key` is not configured.
    pub fn surface(&self, key: &'static str) -> Result<&ApiSurface, SuiteError> {
        self.surfaces.get(key).ok_or(SuiteError::MissingApi(key))
    }

    /// Loads the cross-API snapshot when the event APIs are configured.
    pub fn load_snapshot(&mut self) {
        let (Some(node), Some(connection), Some(events)) = (
            self.surfaces.get(NODE_API),
            self.surfaces.get(CONNECTION_API),
            self.surfaces.get(EVENTS_API),
        ) else {
            return;
        };
        let loader = SnapshotLoader::new(Arc::clone(&self.client))
            .with_cache(self.cache.clone())
            .with_log(Arc::clone(&self.log));
        self.model = Some(loader.load(SnapshotApis {
            node,
            connection,
            events,
        }));
    }

    /// Returns the snapshot.
    fn model(&self) -> Result<&CorrelationModel, SuiteError> {
        self.model.as_ref().ok_or(SuiteError::MissingApi(NODE_API))
    }
}

/// Crawl settings taken from the `[schemas]` and `[crawler]` sections.
#[derive(Debug, Clone, Default)]
pub struct CrawlSettings {
    /// Schema directory used as `$ref` base.
    pub schema_root: PathBuf,
    /// Identifier expansion policy.
    pub expansion: ExpansionPolicy,
    /// Templates skipped by the crawler.
    pub omit_paths: Vec<String>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A statically declared test case.
#[derive(Clone, Copy)]
pub struct TestCase {
    /// Stable outcome name.
    pub name: &'static str,
    /// One-line description for listings.
    pub description: &'static str,
    /// API keys the case needs.
    pub requires: &'static [&'static str],
    /// Case body.
    pub run: fn(&mut SuiteContext, &str) -> Result<TestOutcome, SuiteError>,
}

/// Registered cases in execution order.
pub const TEST_CASES: &[TestCase] = &[
    TestCase {
        name: "ext_params",
        description: "Event senders carry exactly the ext parameters of their transport",
        requires: EVENT_APIS,
        run: ext_params,
    },
    TestCase {
        name: "source_correspondence",
        description: "Events API sources match their Node API sources, flows and senders",
        requires: EVENT_APIS,
        run: source_correspondence,
    },
    TestCase {
        name: "websocket_device_consistency",
        description: "WebSocket senders of one device share connection parameters",
        requires: EVENT_APIS,
        run: websocket_device_consistency,
    },
    TestCase {
        name: "websocket_lifecycle",
        description: "WebSocket endpoints honour the heartbeat open and close timing",
        requires: EVENT_APIS,
        run: websocket_lifecycle,
    },
];

/// Case body for `ext_params`.
fn ext_params(ctx: &mut SuiteContext, name: &str) -> Result<TestOutcome, SuiteError> {
    Ok(check_ext_params(name, ctx.model()?))
}

/// Case body for `source_correspondence`.
fn source_correspondence(ctx: &mut SuiteContext, name: &str) -> Result<TestOutcome, SuiteError> {
    Ok(check_source_correspondence(name, ctx.model()?, ctx.surface(EVENTS_API)?))
}

/// Case body for `websocket_device_consistency`.
fn websocket_device_consistency(
    ctx: &mut SuiteContext,
    name: &str,
) -> Result<TestOutcome, SuiteError> {
    Ok(check_websocket_device_consistency(name, ctx.model()?))
}

/// Case body for `websocket_lifecycle`.
fn websocket_lifecycle(ctx: &mut SuiteContext, name: &str) -> Result<TestOutcome, SuiteError> {
    let connection =
        ctx.surfaces.get(CONNECTION_API).ok_or(SuiteError::MissingApi(CONNECTION_API))?;
    let model = ctx.model.as_mut().ok_or(SuiteError::MissingApi(NODE_API))?;
    let endpoints =
        discover_connection_sources(ctx.client.as_ref(), connection, model, ctx.log.as_ref())?;
    let uris: Vec<String> = endpoints.into_keys().collect();
    let mut verifier = SessionLifecycleVerifier::new(Arc::clone(&ctx.connector))
        .with_timings(ctx.timings)
        .with_log(Arc::clone(&ctx.log));
    if let Some(clock) = &ctx.clock {
        verifier = verifier.with_clock(Arc::clone(clock));
    }
    Ok(verifier.verify(name, &uris))
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs root checks, the crawl, and the selected cases.
///
/// `selected` limits the registered cases by name; `None` runs them all.
#[must_use]
pub fn run_suite(
    ctx: &mut SuiteContext,
    crawl: &CrawlSettings,
    selected: Option<&[String]>,
) -> Vec<TestOutcome> {
    let mut outcomes = Vec::new();
    for surface in ctx.surfaces.values() {
        outcomes.extend(api_root_checks(ctx.client.as_ref(), surface));
    }

    let resolver = SchemaResolver::new(crawl.schema_root.clone()).with_log(Arc::clone(&ctx.log));
    let validator = ResponseValidator::new(Arc::new(resolver));
    let mut crawler = ResourceCrawler::new(Arc::clone(&ctx.client), validator)
        .with_expansion(crawl.expansion)
        .with_omit_paths(crawl.omit_paths.iter().cloned())
        .with_log(Arc::clone(&ctx.log));
    let apis: Vec<&ApiSurface> = ctx.surfaces.values().collect();
    outcomes.extend(crawler.crawl(&apis));
    ctx.cache = crawler.into_cache();

    let cases: Vec<&TestCase> = TEST_CASES
        .iter()
        .filter(|case| selected.is_none_or(|names| names.iter().any(|name| name == case.name)))
        .collect();
    if cases.iter().any(|case| ctx.configures(case.requires)) {
        ctx.load_snapshot();
    }
    for case in cases {
        outcomes.push(run_case(ctx, case));
    }
    outcomes
}

/// Runs one case, converting inapplicability and errors into outcomes.
fn run_case(ctx: &mut SuiteContext, case: &TestCase) -> TestOutcome {
    if let Some(missing) = case.requires.iter().find(|key| !ctx.surfaces.contains_key(**key)) {
        return TestOutcome::not_applicable(
            case.name,
            format!("Requires the {missing} API to be configured"),
        );
    }
    ctx.log.record(&RunEvent::new("case_started", LogLevel::Info, COMPONENT, case.name));
    match (case.run)(ctx, case.name) {
        Ok(outcome) => outcome,
        Err(err) => {
            ctx.log.record(&RunEvent::new(
                "case_failed",
                LogLevel::Warn,
                COMPONENT,
                format!("{}: {err}", case.name),
            ));
            TestOutcome::fail(case.name, err.to_string())
        }
    }
}

// ============================================================================
// SECTION: Config Mapping
// ============================================================================

/// Maps the `[session]` section onto verifier timings.
#[must_use]
pub const fn session_timings(config: &SessionConfig) -> SessionTimings {
    SessionTimings {
        heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
        heartbeat_timeout: Duration::from_millis(config.heartbeat_timeout_ms),
        open_timeout: Duration::from_millis(config.open_timeout_ms),
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        pre_timeout_margin: Duration::from_millis(config.pre_timeout_margin_ms),
        boundary_strictness: config.boundary_strictness,
    }
}

/// Maps the `[http]` section onto client limits.
#[must_use]
pub fn http_client_config(config: &HttpConfig) -> HttpClientConfig {
    HttpClientConfig {
        timeout_ms: config.timeout_ms,
        max_response_bytes: config.max_response_bytes,
        max_redirects: config.max_redirects,
        user_agent: config.user_agent.clone(),
    }
}
