// crates/nmos-testing-crawler/src/crawler.rs
// ============================================================================
// Module: Resource Crawler
// Description: Walks declared read endpoints and harvests identifiers.
// Purpose: Exercise every GET an API promises with data the API exposed.
// Dependencies: nmos-testing-core, nmos-testing-schema
// ============================================================================

//! ## Overview
//! For each declared GET expecting `200`, the crawler classifies the path by
//! parameter count:
//! - none: request the path directly.
//! - one: substitute identifiers harvested from the collection path, or
//!   report NOT_APPLICABLE when nothing was harvested.
//! - several: report MANUAL.
//!
//! Every successful list response is harvested into the crawler-owned
//! [`IdentifierCache`], which later stages read but never write. Keys are
//! the API-qualified collection path (`/x-nmos/<api>/<version><path>`), so
//! two APIs exposing the same path never share identifiers.
//!
//! Invariants:
//! - No identifier is substituted unless it was harvested in this run from
//!   the collection path of the parameterized template.
//! - Exactly one outcome is produced per request; transport faults are FAIL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::ExpansionPolicy;
use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::ResourceSpec;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::harvest_identifiers;
use nmos_testing_schema::ResponseValidator;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Status every crawled read is expected to return.
const EXPECTED_STATUS: u16 = 200;
/// Message for a parameterized path with nothing harvested.
pub const NO_RESOURCES_MESSAGE: &str = "No resources found to perform this test";
/// Message for paths with several parameters.
pub const MULTI_PARAM_MESSAGE: &str = "Paths with multiple parameters require manual testing";

// ============================================================================
// SECTION: Crawler
// ============================================================================

/// Crawls declared read endpoints of one or more APIs.
pub struct ResourceCrawler {
    /// HTTP seam used for every request.
    client: Arc<dyn HttpClient>,
    /// Response grader.
    validator: ResponseValidator,
    /// How many harvested identifiers each parameterized path is tested with.
    expansion: ExpansionPolicy,
    /// Templates excluded from the crawl.
    omit_paths: BTreeSet<String>,
    /// Identifiers harvested so far; only the crawler writes it.
    cache: IdentifierCache,
    /// Run log sink.
    log: Arc<dyn RunLog>,
}

impl ResourceCrawler {
    /// Creates a crawler with an empty cache and the default policy.
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>, validator: ResponseValidator) -> Self {
        Self {
            client,
            validator,
            expansion: ExpansionPolicy::default(),
            omit_paths: BTreeSet::new(),
            cache: IdentifierCache::new(),
            log: Arc::new(NoopRunLog),
        }
    }

    /// Sets the expansion policy.
    #[must_use]
    pub const fn with_expansion(mut self, expansion: ExpansionPolicy) -> Self {
        self.expansion = expansion;
        self
    }

    /// Sets the templates excluded from the crawl.
    #[must_use]
    pub fn with_omit_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a run log sink.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Returns the identifiers harvested so far.
    #[must_use]
    pub const fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    /// Consumes the crawler, yielding its cache.
    #[must_use]
    pub fn into_cache(self) -> IdentifierCache {
        self.cache
    }

    /// Crawls every declared read of `apis` in declaration order.
    pub fn crawl(&mut self, apis: &[&ApiSurface]) -> Vec<TestOutcome> {
        let mut outcomes = Vec::new();
        for api in apis {
            for resource in api.reads() {
                if !resource.declares(EXPECTED_STATUS) {
                    continue;
                }
                if self.omit_paths.contains(&resource.path) {
                    self.log.record(
                        &RunEvent::new("crawl_omitted", LogLevel::Debug, "crawler", &resource.path)
                            .with_api(api.name()),
                    );
                    continue;
                }
                outcomes.extend(self.check_resource(api, resource));
            }
        }
        outcomes
    }

    /// Produces the outcomes for one declared resource.
    fn check_resource(&mut self, api: &ApiSurface, resource: &ResourceSpec) -> Vec<TestOutcome> {
        match resource.params.len() {
            0 => vec![self.visit(api, resource, &resource.path)],
            1 => {
                let targets = self.targets(api, resource);
                if targets.is_empty() {
                    return vec![TestOutcome::not_applicable(
                        test_name(api, resource, &resource.path),
                        NO_RESOURCES_MESSAGE,
                    )];
                }
                targets.iter().map(|path| self.visit(api, resource, path)).collect()
            }
            _ => vec![TestOutcome::manual(
                test_name(api, resource, &resource.path),
                MULTI_PARAM_MESSAGE,
            )],
        }
    }

    /// Returns the concrete paths to request for a single-parameter template.
    fn targets(&self, api: &ApiSurface, resource: &ResourceSpec) -> Vec<String> {
        let Some(ids) = self.cache.get(&api.display_path(&resource.collection_path())) else {
            return Vec::new();
        };
        let chosen: Vec<&String> = match self.expansion {
            ExpansionPolicy::First => ids.iter().take(1).collect(),
            ExpansionPolicy::All => {
                let mut seen = BTreeSet::new();
                ids.iter().filter(|id| seen.insert(id.as_str())).collect()
            }
        };
        chosen.into_iter().filter_map(|id| resource.substitute(id)).collect()
    }

    /// Requests one concrete path, harvests its identifiers, and grades it.
    fn visit(&mut self, api: &ApiSurface, resource: &ResourceSpec, path: &str) -> TestOutcome {
        let name = test_name(api, resource, path);
        let request = HttpRequest::new(resource.method, api.url_for(path));
        let response = match self.client.send(&request) {
            Ok(response) => response,
            Err(err) => {
                self.log.record(
                    &RunEvent::new("http_failed", LogLevel::Warn, "crawler", err.to_string())
                        .with_api(api.name())
                        .with_url(request.url),
                );
                return TestOutcome::fail(name, err.to_string());
            }
        };
        if response.status != EXPECTED_STATUS {
            return TestOutcome::fail(name, format!("Incorrect response code: {}", response.status));
        }
        if let Ok(body) = response.json() {
            let added =
                self.cache.append(&api.display_path(&resource.path), harvest_identifiers(&body));
            if added > 0 {
                self.log.record(
                    &RunEvent::new(
                        "ids_harvested",
                        LogLevel::Debug,
                        "crawler",
                        format!("{added} identifiers under {}", resource.path),
                    )
                    .with_api(api.name()),
                );
            }
        }
        self.validator.validate(&name, api, resource.method, &resource.path, &response)
    }
}

/// Renders `METHOD /x-nmos/<api>/<version><path>`.
fn test_name(api: &ApiSurface, resource: &ResourceSpec, path: &str) -> String {
    format!("{} {}", resource.method, api.display_path(path))
}
