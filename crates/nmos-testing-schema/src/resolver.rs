// crates/nmos-testing-schema/src/resolver.rs
// ============================================================================
// Module: Schema Resolver
// Description: Maps declared responses to compiled JSON schema validators.
// Purpose: Resolve schema documents and their `$ref`s from a local root.
// Dependencies: jsonschema, nmos-testing-core, serde_json, url
// ============================================================================

//! ## Overview
//! The resolver looks a response up in an [`ApiSurface`], loads the schema
//! file it names from the schema root, and compiles it against a registry
//! holding every `*.json` document under that root. Documents are keyed by
//! their `file://` URI so relative `$ref`s resolve without network access.
//!
//! Outcomes:
//! - No declaration, a `null` schema, or a missing file: `Ok(None)`.
//! - Malformed document or failed compile: [`SchemaError`].
//!
//! Resolved handles are cached per `(api, method, path, status)` for the
//! lifetime of the resolver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;

use jsonschema::Draft;
use jsonschema::Registry;
use jsonschema::Validator;
use nmos_testing_core::ApiSurface;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use serde_json::Value;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum schema document size in bytes.
const MAX_SCHEMA_FILE_SIZE: u64 = 1024 * 1024;
/// Maximum directory depth scanned under the schema root.
const MAX_SCAN_DEPTH: usize = 16;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cache key: API name, method, path template, status code.
type SchemaKey = (String, HttpMethod, String, u16);

/// A compiled schema with the URI its references resolve against.
pub struct SchemaHandle {
    /// Schema document as loaded (with its base URI stamped in).
    pub document: Value,
    /// `file://` URI of the document.
    pub base_uri: Url,
    /// Compiled validator.
    validator: Validator,
}

impl SchemaHandle {
    /// Returns every validation diagnostic for `instance`, in validator order.
    #[must_use]
    pub fn diagnostics(&self, instance: &Value) -> Vec<String> {
        self.validator.iter_errors(instance).map(|err| err.to_string()).collect()
    }

    /// Returns true when `instance` satisfies the schema.
    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaHandle").field("base_uri", &self.base_uri.as_str()).finish()
    }
}

/// Schema resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Filesystem failure.
    #[error("schema io error: {0}")]
    Io(String),
    /// Document is not valid JSON.
    #[error("malformed schema {file}: {message}")]
    Malformed {
        /// Offending file.
        file: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Document could not be compiled (bad keyword or unresolvable `$ref`).
    #[error("schema compile error {file}: {message}")]
    Compile {
        /// Offending file.
        file: String,
        /// Compiler diagnostic.
        message: String,
    },
    /// The reference registry could not be built.
    #[error("schema registry error: {0}")]
    Registry(String),
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves declared responses to compiled schemas under a local root.
pub struct SchemaResolver {
    /// Absolute schema root.
    root: PathBuf,
    /// Draft used to interpret documents.
    draft: Draft,
    /// Registry of every document under the root, built on first use.
    registry: OnceLock<Result<Registry, SchemaError>>,
    /// Resolved handles keyed by declaration.
    handles: Mutex<BTreeMap<SchemaKey, Option<Arc<SchemaHandle>>>>,
    /// Run log sink.
    log: Arc<dyn RunLog>,
}

impl SchemaResolver {
    /// Creates a resolver for `root` interpreting documents as draft 4.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute_root(root.into()),
            draft: Draft::Draft4,
            registry: OnceLock::new(),
            handles: Mutex::new(BTreeMap::new()),
            log: Arc::new(NoopRunLog),
        }
    }

    /// Overrides the draft used to interpret documents.
    #[must_use]
    pub const fn with_draft(mut self, draft: Draft) -> Self {
        self.draft = draft;
        self
    }

    /// Attaches a run log sink.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Returns the absolute schema root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the schema for a declared response.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the declared document exists but cannot
    /// be parsed or compiled.
    pub fn resolve(
        &self,
        api: &ApiSurface,
        method: HttpMethod,
        path: &str,
        status: u16,
    ) -> Result<Option<Arc<SchemaHandle>>, SchemaError> {
        let key = (api.name().to_string(), method, path.to_string(), status);
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }
        let resolved = self.load(api, method, path, status)?;
        if let Ok(mut handles) = self.handles.lock() {
            handles.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    /// Compiles the schema document at `path` against the root registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the file cannot be read, parsed, or
    /// compiled.
    pub fn compile_file(&self, path: &Path) -> Result<SchemaHandle, SchemaError> {
        let label = path.display().to_string();
        let mut document = read_json(path)?;
        let base_uri = file_uri(path)?;
        stamp_base_uri(&mut document, self.draft, &base_uri);
        let registry = self.registry()?;
        let validator = jsonschema::options()
            .with_draft(self.draft)
            .with_registry(registry.clone())
            .build(&document)
            .map_err(|err| SchemaError::Compile {
                file: label,
                message: err.to_string(),
            })?;
        Ok(SchemaHandle {
            document,
            base_uri,
            validator,
        })
    }

    /// Returns a cached resolution, if one exists.
    fn cached(&self, key: &SchemaKey) -> Option<Option<Arc<SchemaHandle>>> {
        self.handles.lock().ok()?.get(key).cloned()
    }

    /// Looks up the declaration and compiles its document.
    fn load(
        &self,
        api: &ApiSurface,
        method: HttpMethod,
        path: &str,
        status: u16,
    ) -> Result<Option<Arc<SchemaHandle>>, SchemaError> {
        let declared =
            api.resource(method, path).and_then(|resource| resource.schema_file(status));
        let Some(file) = declared else {
            self.note_missing(api, format!("no schema declared for {method} {path} {status}"));
            return Ok(None);
        };
        let file_path = self.root.join(file);
        if !file_path.is_file() {
            self.note_missing(api, format!("schema file not found: {}", file_path.display()));
            return Ok(None);
        }
        let handle = self.compile_file(&file_path)?;
        self.log.record(
            &RunEvent::new("schema_resolved", LogLevel::Debug, "schema", file)
                .with_api(api.name()),
        );
        Ok(Some(Arc::new(handle)))
    }

    /// Logs an absent schema.
    fn note_missing(&self, api: &ApiSurface, message: String) {
        self.log.record(
            &RunEvent::new("schema_missing", LogLevel::Info, "schema", message)
                .with_api(api.name()),
        );
    }

    /// Returns the registry, building it on first use.
    fn registry(&self) -> Result<&Registry, SchemaError> {
        self.registry
            .get_or_init(|| build_registry(&self.root, self.draft, self.log.as_ref()))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaResolver").field("root", &self.root).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Makes the schema root absolute so it can be expressed as a file URI.
fn absolute_root(root: PathBuf) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(&root) {
        return canonical;
    }
    match std::path::absolute(&root) {
        Ok(absolute) => absolute,
        Err(_) => root,
    }
}

/// Builds a registry holding every parseable document under `root`.
fn build_registry(root: &Path, draft: Draft, log: &dyn RunLog) -> Result<Registry, SchemaError> {
    let mut files = Vec::new();
    collect_schema_files(root, 0, &mut files);
    files.sort();
    let mut resources = Vec::with_capacity(files.len());
    for file in files {
        let document = match read_json(&file) {
            Ok(document) => document,
            Err(err) => {
                log.record(&RunEvent::new(
                    "schema_skipped",
                    LogLevel::Warn,
                    "schema",
                    err.to_string(),
                ));
                continue;
            }
        };
        let uri = file_uri(&file)?;
        resources.push((uri.to_string(), draft.create_resource(document)));
    }
    Registry::try_from_resources(resources).map_err(|err| SchemaError::Registry(err.to_string()))
}

/// Recursively collects `*.json` files.
fn collect_schema_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_schema_files(&path, depth + 1, out);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
}

/// Reads and parses a schema document.
fn read_json(path: &Path) -> Result<Value, SchemaError> {
    let label = path.display().to_string();
    let size = fs::metadata(path).map_err(|err| SchemaError::Io(format!("{label}: {err}")))?.len();
    if size > MAX_SCHEMA_FILE_SIZE {
        return Err(SchemaError::Malformed {
            file: label,
            message: "schema file exceeds size limit".to_string(),
        });
    }
    let bytes = fs::read(path).map_err(|err| SchemaError::Io(format!("{label}: {err}")))?;
    serde_json::from_slice(&bytes).map_err(|err| SchemaError::Malformed {
        file: label,
        message: err.to_string(),
    })
}

/// Expresses an absolute path as a `file://` URI.
fn file_uri(path: &Path) -> Result<Url, SchemaError> {
    Url::from_file_path(path)
        .map_err(|()| SchemaError::Io(format!("cannot express {} as a file uri", path.display())))
}

/// Records the document's own URI as its identifier when it declares none,
/// so relative references resolve against its directory.
fn stamp_base_uri(document: &mut Value, draft: Draft, uri: &Url) {
    let Value::Object(map) = document else {
        return;
    };
    if map.contains_key("id") || map.contains_key("$id") {
        return;
    }
    let keyword = if matches!(draft, Draft::Draft4) { "id" } else { "$id" };
    map.insert(keyword.to_string(), Value::String(uri.to_string()));
}
