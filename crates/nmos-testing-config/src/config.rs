// crates/nmos-testing-config/src/config.rs
// ============================================================================
// Module: Testing Configuration
// Description: Loading and validation of nmos-testing.toml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: nmos-testing-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Relative paths (surface manifests, schema root, log file) resolve against
//! the directory holding the config file. Invalid configuration fails closed
//! before any request reaches the implementation under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use nmos_testing_core::ApiSurface;
use nmos_testing_core::ApiVersion;
use nmos_testing_core::BoundaryStrictness;
use nmos_testing_core::ExpansionPolicy;
use nmos_testing_core::SurfaceManifest;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "nmos-testing.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "NMOS_TESTING_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum surface manifest size in bytes.
pub(crate) const MAX_MANIFEST_FILE_SIZE: usize = 4 * 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Template omitted from the crawl unless overridden.
pub const DEFAULT_OMIT_PATH: &str = "/single/senders/{senderId}/transportfile";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Root of `nmos-testing.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestingConfig {
    /// APIs under test keyed by API name (`node`, `connection`, `events`).
    #[serde(default)]
    pub apis: BTreeMap<String, ApiConfig>,
    /// Schema directory settings.
    #[serde(default)]
    pub schemas: SchemaConfig,
    /// Crawl behaviour.
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// HTTP client limits.
    #[serde(default)]
    pub http: HttpConfig,
    /// Session lifecycle timings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Run log settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Directory relative paths resolve against (not serialized).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl TestingConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then [`CONFIG_ENV_VAR`], then `nmos-testing.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.base_dir =
            resolved.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parses and validates configuration text. Relative paths resolve
    /// against the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apis.is_empty() {
            return Err(ConfigError::Invalid("at least one [apis.<name>] entry is required".into()));
        }
        for (name, api) in &self.apis {
            api.validate(name)?;
        }
        validate_path_string("schemas.root", &self.schemas.root)?;
        self.crawler.validate()?;
        self.http.validate()?;
        self.session.validate()?;
        if let Some(path) = &self.log.path {
            validate_path_string("log.path", path)?;
        }
        Ok(())
    }

    /// Resolves a configured path against the config file directory.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path.trim());
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }

    /// Returns the resolved schema root directory.
    #[must_use]
    pub fn schema_root(&self) -> PathBuf {
        self.resolve(&self.schemas.root)
    }

    /// Returns the resolved run log path, if configured.
    #[must_use]
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log.path.as_deref().map(|path| self.resolve(path))
    }

    /// Loads every configured API surface from its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a manifest cannot be read or is invalid.
    pub fn load_surfaces(&self) -> Result<BTreeMap<String, ApiSurface>, ConfigError> {
        let mut surfaces = BTreeMap::new();
        for (name, api) in &self.apis {
            let surface = api.load_surface(name, &self.resolve(&api.surface))?;
            surfaces.insert(name.clone(), surface);
        }
        Ok(surfaces)
    }
}

/// One API under test.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// API version root URL, e.g. `http://host/x-nmos/node/v1.2/`.
    pub base_url: String,
    /// Declared version label, e.g. `v1.2`.
    pub version: String,
    /// Path to the surface manifest JSON.
    pub surface: String,
    /// Optional NMOS documentation branch for reference links.
    #[serde(default)]
    pub spec_branch: Option<String>,
}

impl ApiConfig {
    /// Validates one API entry.
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(ConfigError::Invalid(format!("invalid api name: '{name}'")));
        }
        let url = Url::parse(self.base_url.trim()).map_err(|err| {
            ConfigError::Invalid(format!("apis.{name}.base_url is not a valid url: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "apis.{name}.base_url must use http:// or https://"
            )));
        }
        self.parsed_version(name)?;
        validate_path_string(&format!("apis.{name}.surface"), &self.surface)?;
        if let Some(branch) = &self.spec_branch
            && branch.trim().is_empty()
        {
            return Err(ConfigError::Invalid(format!("apis.{name}.spec_branch must be non-empty")));
        }
        Ok(())
    }

    /// Parses the declared version label.
    fn parsed_version(&self, name: &str) -> Result<ApiVersion, ConfigError> {
        self.version.parse::<ApiVersion>().map_err(|_| {
            ConfigError::Invalid(format!("apis.{name}.version must look like v<major>.<minor>"))
        })
    }

    /// Reads the manifest at `path` and builds the surface.
    fn load_surface(&self, name: &str, path: &Path) -> Result<ApiSurface, ConfigError> {
        let bytes = fs::read(path).map_err(|err| {
            ConfigError::Io(format!("apis.{name}.surface {}: {err}", path.display()))
        })?;
        if bytes.len() > MAX_MANIFEST_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "apis.{name}.surface exceeds size limit"
            )));
        }
        let manifest = SurfaceManifest::from_json_slice(&bytes)
            .map_err(|err| ConfigError::Invalid(format!("apis.{name}.surface: {err}")))?;
        let surface =
            ApiSurface::from_manifest(name, &self.base_url, self.parsed_version(name)?, manifest)
                .map_err(|err| ConfigError::Invalid(format!("apis.{name}.surface: {err}")))?;
        Ok(match &self.spec_branch {
            Some(branch) => surface.with_spec_branch(branch.trim()),
            None => surface,
        })
    }
}

/// Schema directory settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Local directory used as the `$ref` base.
    #[serde(default = "default_schema_root")]
    pub root: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            root: default_schema_root(),
        }
    }
}

/// Crawl behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Identifier expansion policy for single-parameter paths.
    #[serde(default)]
    pub expansion: ExpansionPolicy,
    /// Path templates excluded from the crawl.
    #[serde(default = "default_omit_paths")]
    pub omit_paths: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            expansion: ExpansionPolicy::default(),
            omit_paths: default_omit_paths(),
        }
    }
}

impl CrawlerConfig {
    /// Validates crawl settings.
    fn validate(&self) -> Result<(), ConfigError> {
        for path in &self.omit_paths {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "crawler.omit_paths entry must start with '/': {path}"
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Maximum redirects followed before failing.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Validates HTTP limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("http.timeout_ms must be greater than zero".into()));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(
                "http.max_response_bytes must be greater than zero".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("http.user_agent must be non-empty".into()));
        }
        Ok(())
    }
}

/// Session lifecycle timings in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Interval between health commands the IUT advertises.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Time without a health command after which the IUT closes a session.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Bound on the open phase.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    /// Polling interval for every timed wait.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Gap between the end of the pre-timeout phase and the timeout.
    #[serde(default = "default_pre_timeout_margin_ms")]
    pub pre_timeout_margin_ms: u64,
    /// When kept-alive sessions are checked during the boundary phase.
    #[serde(default)]
    pub boundary_strictness: BoundaryStrictness,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            pre_timeout_margin_ms: default_pre_timeout_margin_ms(),
            boundary_strictness: BoundaryStrictness::default(),
        }
    }
}

impl SessionConfig {
    /// Validates timing relationships.
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("session.heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("session.heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("session.open_timeout_ms", self.open_timeout_ms),
            ("session.poll_interval_ms", self.poll_interval_ms),
            ("session.pre_timeout_margin_ms", self.pre_timeout_margin_ms),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
            }
        }
        if self.heartbeat_interval_ms >= self.heartbeat_timeout_ms {
            return Err(ConfigError::Invalid(
                "session.heartbeat_interval_ms must be less than heartbeat_timeout_ms".into(),
            ));
        }
        if self.pre_timeout_margin_ms >= self.heartbeat_timeout_ms {
            return Err(ConfigError::Invalid(
                "session.pre_timeout_margin_ms must be less than heartbeat_timeout_ms".into(),
            ));
        }
        if self.poll_interval_ms > self.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(
                "session.poll_interval_ms must not exceed heartbeat_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Run log settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// JSON-lines log file; stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default schema directory.
fn default_schema_root() -> String {
    "schemas".to_string()
}

/// Default crawl omissions.
fn default_omit_paths() -> Vec<String> {
    vec![DEFAULT_OMIT_PATH.to_string()]
}

/// Default per-request timeout.
const fn default_http_timeout_ms() -> u64 {
    10_000
}

/// Default response body limit.
const fn default_max_response_bytes() -> usize {
    4 * 1024 * 1024
}

/// Default redirect limit.
const fn default_max_redirects() -> usize {
    10
}

/// Default user agent.
fn default_user_agent() -> String {
    concat!("nmos-testing/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Default heartbeat interval.
const fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

/// Default heartbeat timeout.
const fn default_heartbeat_timeout_ms() -> u64 {
    12_000
}

/// Default open-phase bound.
const fn default_open_timeout_ms() -> u64 {
    1_000
}

/// Default polling interval.
const fn default_poll_interval_ms() -> u64 {
    200
}

/// Default pre-timeout margin.
const fn default_pre_timeout_margin_ms() -> u64 {
    1_000
}
