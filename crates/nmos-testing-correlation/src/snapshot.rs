// crates/nmos-testing-correlation/src/snapshot.rs
// ============================================================================
// Module: Correlation Snapshot
// Description: Fetches node, connection, and events collections into a model.
// Purpose: Build the one cross-API view a run's correlation checks share.
// Dependencies: nmos-testing-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The loader issues plain GETs against each API and indexes what came back.
//! A failed fetch is logged and leaves its collection partial; loading never
//! fails as a whole. The checks then see the gaps as absent joins.
//!
//! Collections built:
//! - `node.sources`, `node.flows`, `node.senders` from the node API lists.
//! - `connection.senders` with each sender's `transport_type`. Connection
//!   APIs older than v1.1 have no `/transporttype` and are taken as RTP.
//! - `connection.active` with each sender's active parameters, kept only when
//!   its first transport leg is an object.
//! - `events.sources` with each source's `state` and `type` documents.
//!
//! A loader given the crawl's [`IdentifierCache`] also covers ids harvested
//! during the crawl that a listing no longer returns (or could not return):
//! node records are fetched one by one, connection senders and event sources
//! are fetched as if listed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::ApiVersion;
use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::TransportError;
use nmos_testing_core::harvest_identifiers;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::model::CorrelationModel;
use crate::model::ResourceRecord;
use crate::topology::CONNECTION_ACTIVE;
use crate::topology::CONNECTION_SENDERS;
use crate::topology::EVENT_SOURCES;
use crate::topology::NODE_FLOWS;
use crate::topology::NODE_SENDERS;
use crate::topology::NODE_SOURCES;
use crate::topology::TRANSPORT_RTP;
use crate::topology::first_leg;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A single snapshot fetch that could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The request failed at the transport level.
    #[error("{url}: {source}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Transport failure.
        source: TransportError,
    },
    /// The response status was not 200.
    #[error("{url}: incorrect response code: {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Observed status.
        status: u16,
    },
    /// The body was not JSON.
    #[error("{url}: non-JSON response: {message}")]
    Json {
        /// Requested URL.
        url: String,
        /// Parser diagnostic.
        message: String,
    },
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// The three APIs a snapshot spans.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotApis<'a> {
    /// Node API.
    pub node: &'a ApiSurface,
    /// Connection API.
    pub connection: &'a ApiSurface,
    /// Events API.
    pub events: &'a ApiSurface,
}

/// Fetches and indexes the correlation snapshot.
pub struct SnapshotLoader {
    /// HTTP seam.
    client: Arc<dyn HttpClient>,
    /// Run log sink.
    log: Arc<dyn RunLog>,
    /// Identifiers harvested by the crawl.
    cache: IdentifierCache,
}

impl SnapshotLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            log: Arc::new(NoopRunLog),
            cache: IdentifierCache::new(),
        }
    }

    /// Seeds the loader with the identifiers the crawl harvested.
    #[must_use]
    pub fn with_cache(mut self, cache: IdentifierCache) -> Self {
        self.cache = cache;
        self
    }

    /// Attaches a run log sink.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Fetches every collection and returns the indexed model.
    #[must_use]
    pub fn load(&self, apis: SnapshotApis<'_>) -> CorrelationModel {
        let mut model = CorrelationModel::new();
        for (collection, path) in
            [(NODE_SOURCES, "/sources"), (NODE_FLOWS, "/flows"), (NODE_SENDERS, "/senders")]
        {
            let mut records = self.fetch(apis.node, path).map_or_else(Vec::new, |body| {
                node_records(apis.node.name(), body)
            });
            for id in self.cached_only(apis.node, path, records.iter().map(ResourceRecord::id)) {
                let record = self
                    .fetch(apis.node, &format!("{path}/{id}"))
                    .and_then(|body| ResourceRecord::from_value(apis.node.name(), body));
                records.extend(record);
            }
            model.index(collection, records);
        }
        model.index_foreign_key(NODE_SENDERS, "flow_id");
        model.index_foreign_key(NODE_SENDERS, "device_id");
        model.index_foreign_key(NODE_FLOWS, "source_id");

        self.load_connection(apis.connection, &mut model);
        self.load_events(apis.events, &mut model);
        self.log.record(&RunEvent::new(
            "snapshot_loaded",
            LogLevel::Info,
            "correlation",
            format!(
                "{} senders, {} flows, {} sources, {} connection senders, {} event sources",
                model.len(NODE_SENDERS),
                model.len(NODE_FLOWS),
                model.len(NODE_SOURCES),
                model.len(CONNECTION_SENDERS),
                model.len(EVENT_SOURCES),
            ),
        ));
        model
    }

    /// Indexes connection API senders and their active parameters.
    fn load_connection(&self, api: &ApiSurface, model: &mut CorrelationModel) {
        let has_transport_type = api.version() >= ApiVersion::new(1, 1);
        for id in self.listed_ids(api, "/single/senders/") {
            let mut fields = Map::new();
            if has_transport_type {
                if let Some(transport) =
                    self.fetch(api, &format!("/single/senders/{id}/transporttype"))
                {
                    fields.insert("transport_type".to_string(), transport);
                }
            } else {
                fields.insert("transport_type".to_string(), Value::from(TRANSPORT_RTP));
            }
            model.index(CONNECTION_SENDERS, [ResourceRecord::new(id.as_str(), api.name(), fields)]);

            let Some(Value::Object(active)) =
                self.fetch(api, &format!("/single/senders/{id}/active"))
            else {
                continue;
            };
            let record = ResourceRecord::new(id.as_str(), api.name(), active);
            if first_leg(&record).is_some() {
                model.index(CONNECTION_ACTIVE, [record]);
            }
        }
    }

    /// Indexes events API sources with their state and type.
    fn load_events(&self, api: &ApiSurface, model: &mut CorrelationModel) {
        for id in self.listed_ids(api, "/sources/") {
            let mut fields = Map::new();
            for part in ["state", "type"] {
                if let Some(body) = self.fetch(api, &format!("/sources/{id}/{part}")) {
                    fields.insert(part.to_string(), body);
                }
            }
            model.index(EVENT_SOURCES, [ResourceRecord::new(id.as_str(), api.name(), fields)]);
        }
    }

    /// Returns the ids a listing reports, followed by cached ids it omits.
    fn listed_ids(&self, api: &ApiSurface, path: &str) -> Vec<String> {
        let mut ids =
            self.fetch(api, path).map_or_else(Vec::new, |listing| harvest_identifiers(&listing));
        let extra = self.cached_only(api, path, ids.iter().map(String::as_str));
        ids.extend(extra);
        ids
    }

    /// Returns ids cached for `path` that are absent from `listed`.
    fn cached_only<'a>(
        &self,
        api: &ApiSurface,
        path: &str,
        listed: impl Iterator<Item = &'a str>,
    ) -> Vec<String> {
        let listed: BTreeSet<&str> = listed.collect();
        let mut seen = BTreeSet::new();
        let extra: Vec<String> = self
            .cache
            .get(&api.display_path(path))
            .unwrap_or_default()
            .iter()
            .filter(|id| !listed.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if !extra.is_empty() {
            self.log.record(
                &RunEvent::new(
                    "snapshot_seeded",
                    LogLevel::Debug,
                    "correlation",
                    format!("{} crawled ids missing from {path}", extra.len()),
                )
                .with_api(api.name()),
            );
        }
        extra
    }

    /// GETs `path` and returns its JSON body, logging any failure.
    fn fetch(&self, api: &ApiSurface, path: &str) -> Option<Value> {
        let url = api.url_for(path);
        match self.fetch_json(&url) {
            Ok(body) => Some(body),
            Err(err) => {
                self.log.record(
                    &RunEvent::new(
                        "snapshot_fetch_failed",
                        LogLevel::Warn,
                        "correlation",
                        err.to_string(),
                    )
                    .with_api(api.name())
                    .with_url(url),
                );
                None
            }
        }
    }

    /// GETs `url` and decodes its JSON body.
    fn fetch_json(&self, url: &str) -> Result<Value, SnapshotError> {
        let response = self.client.send(&HttpRequest::get(url)).map_err(|source| {
            SnapshotError::Transport {
                url: url.to_string(),
                source,
            }
        })?;
        if response.status != 200 {
            return Err(SnapshotError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        response.json().map_err(|err| SnapshotError::Json {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

/// Converts a node API list body into records, dropping entries without ids.
fn node_records(api: &str, body: Value) -> Vec<ResourceRecord> {
    match body {
        Value::Array(entries) => {
            entries.into_iter().filter_map(|entry| ResourceRecord::from_value(api, entry)).collect()
        }
        _ => Vec::new(),
    }
}
