// crates/nmos-testing-core/src/surface.rs
// ============================================================================
// Module: API Surfaces
// Description: Declared endpoints, parameters, and versions of an API.
// Purpose: Describe what an API promises so the crawler can exercise it.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! An [`ApiSurface`] is built once from a [`SurfaceManifest`] (the product of
//! the external interface-definition loader) and never mutated afterwards.
//! Path parameters are derived from `{name}` template segments so the
//! manifest cannot disagree with its own templates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: HTTP Methods
// ============================================================================

/// HTTP verbs the engine issues or finds declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// HEAD.
    Head,
    /// OPTIONS.
    Options,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl HttpMethod {
    /// Returns the canonical upper-case verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true for verbs whose responses must carry the extended CORS
    /// header set (allow-headers and allow-methods).
    #[must_use]
    pub const fn requires_extended_cors(self) -> bool {
        matches!(self, Self::Options | Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SurfaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(SurfaceError::UnknownMethod(value.to_string())),
        }
    }
}

// ============================================================================
// SECTION: API Versions
// ============================================================================

/// Parsed `v<major>.<minor>` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
}

impl ApiVersion {
    /// Builds a version from its parts.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = SurfaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || SurfaceError::InvalidVersion(value.to_string());
        let trimmed = value.trim().strip_prefix('v').ok_or_else(invalid)?;
        let (major, minor) = trimmed.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// SECTION: Resources
// ============================================================================

/// One `{name}` parameter of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name without braces.
    pub name: String,
    /// Zero-based index of the segment holding the parameter.
    pub position: usize,
}

/// A declared `(path template, method)` pair.
///
/// # Invariants
/// - `params` lists the template's parameters in segment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Path template relative to the API base URL.
    pub path: String,
    /// Declared method.
    pub method: HttpMethod,
    /// Declared status codes mapped to their schema file, if any.
    pub responses: BTreeMap<u16, Option<String>>,
    /// Template parameters.
    pub params: Vec<ParamSpec>,
}

impl ResourceSpec {
    /// Builds a resource declaration, deriving parameters from the template.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        method: HttpMethod,
        responses: BTreeMap<u16, Option<String>>,
    ) -> Self {
        let path = path.into();
        let params = parse_params(&path);
        Self {
            path,
            method,
            responses,
            params,
        }
    }

    /// Returns true when the status code is declared for this resource.
    #[must_use]
    pub fn declares(&self, status: u16) -> bool {
        self.responses.contains_key(&status)
    }

    /// Returns the schema file declared for the status code, if any.
    #[must_use]
    pub fn schema_file(&self, status: u16) -> Option<&str> {
        self.responses.get(&status).and_then(Option::as_deref)
    }

    /// Returns the collection path this resource's parameter is drawn from.
    #[must_use]
    pub fn collection_path(&self) -> String {
        collection_path(&self.path)
    }

    /// Substitutes a value for the single template parameter.
    ///
    /// Returns `None` unless the template has exactly one parameter.
    #[must_use]
    pub fn substitute(&self, value: &str) -> Option<String> {
        let [param] = self.params.as_slice() else {
            return None;
        };
        Some(self.path.replace(&format!("{{{}}}", param.name), value))
    }
}

/// Extracts `{name}` parameters from a path template.
#[must_use]
pub fn parse_params(template: &str) -> Vec<ParamSpec> {
    template
        .split('/')
        .enumerate()
        .filter_map(|(position, segment)| {
            segment.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')).map(|name| {
                ParamSpec {
                    name: name.to_string(),
                    position,
                }
            })
        })
        .collect()
}

/// Returns the template prefix preceding its first parameter segment.
///
/// Empty segments are dropped, so `/single/senders/{senderId}/` and
/// `/single/senders/` both yield `/single/senders`.
#[must_use]
pub fn collection_path(template: &str) -> String {
    let mut path = String::new();
    for segment in template.split('/') {
        if segment.starts_with('{') {
            break;
        }
        if !segment.is_empty() {
            path.push('/');
            path.push_str(segment);
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Serialized surface produced by the interface-definition loader.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SurfaceManifest {
    /// Declared resources in declaration order.
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
}

/// One resource entry of a [`SurfaceManifest`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestResource {
    /// Path template.
    pub path: String,
    /// Declared method.
    pub method: HttpMethod,
    /// Status code (as a string key) to schema file or `null`.
    #[serde(default)]
    pub responses: BTreeMap<String, Option<String>>,
}

impl SurfaceManifest {
    /// Parses a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::Parse`] when the bytes are not a manifest.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SurfaceError> {
        serde_json::from_slice(bytes).map_err(|err| SurfaceError::Parse(err.to_string()))
    }
}

// ============================================================================
// SECTION: API Surface
// ============================================================================

/// Declared surface of one API under test.
#[derive(Debug, Clone)]
pub struct ApiSurface {
    /// API key, e.g. `node`, `connection`, `events`.
    name: String,
    /// API version root URL without a trailing slash.
    base_url: String,
    /// Declared version label, e.g. `v1.2`.
    version: ApiVersion,
    /// Specification branch used in reference links.
    spec_branch: String,
    /// Declared resources in declaration order.
    resources: Vec<ResourceSpec>,
}

impl ApiSurface {
    /// Builds a surface from explicit resource declarations.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        version: ApiVersion,
        resources: Vec<ResourceSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version,
            spec_branch: format!("{version}.x"),
            resources,
        }
    }

    /// Builds a surface from a parsed manifest.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] when a status key is not a valid code or a
    /// `(path, method)` pair is declared twice.
    pub fn from_manifest(
        name: impl Into<String>,
        base_url: &str,
        version: ApiVersion,
        manifest: SurfaceManifest,
    ) -> Result<Self, SurfaceError> {
        let mut resources: Vec<ResourceSpec> = Vec::with_capacity(manifest.resources.len());
        for entry in manifest.resources {
            let duplicate = resources
                .iter()
                .any(|known| known.path == entry.path && known.method == entry.method);
            if duplicate {
                return Err(SurfaceError::Duplicate {
                    method: entry.method,
                    path: entry.path,
                });
            }
            let mut responses = BTreeMap::new();
            for (code, schema) in entry.responses {
                let status = code
                    .parse::<u16>()
                    .map_err(|_| SurfaceError::InvalidStatus(code.clone()))?;
                responses.insert(status, schema);
            }
            resources.push(ResourceSpec::new(entry.path, entry.method, responses));
        }
        Ok(Self::new(name, base_url, version, resources))
    }

    /// Overrides the NMOS documentation branch used in reference links.
    #[must_use]
    pub fn with_spec_branch(mut self, branch: impl Into<String>) -> Self {
        self.spec_branch = branch.into();
        self
    }

    /// Returns the API key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the API version root URL (no trailing slash).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the declared version.
    #[must_use]
    pub const fn version(&self) -> ApiVersion {
        self.version
    }

    /// Returns the NMOS documentation branch label.
    #[must_use]
    pub fn spec_branch(&self) -> &str {
        &self.spec_branch
    }

    /// Returns all declared resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    /// Returns declared GET resources in declaration order.
    pub fn reads(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter().filter(|resource| resource.method == HttpMethod::Get)
    }

    /// Looks up the declaration for a `(method, path template)` pair.
    #[must_use]
    pub fn resource(&self, method: HttpMethod, path: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|resource| resource.method == method && resource.path == path)
    }

    /// Joins a path onto the base URL.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Renders the report label for a path, e.g. `/x-nmos/node/v1.2/senders`.
    #[must_use]
    pub fn display_path(&self, path: &str) -> String {
        format!("/x-nmos/{}/{}{path}", self.name, self.version)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building a surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// Manifest could not be parsed.
    #[error("surface manifest parse error: {0}")]
    Parse(String),
    /// Unknown HTTP method.
    #[error("unknown http method: {0}")]
    UnknownMethod(String),
    /// Response key is not a status code.
    #[error("invalid status code key: {0}")]
    InvalidStatus(String),
    /// Version label is not `v<major>.<minor>`.
    #[error("invalid api version: {0}")]
    InvalidVersion(String),
    /// The same `(path, method)` was declared twice.
    #[error("duplicate resource declaration: {method} {path}")]
    Duplicate {
        /// Declared method.
        method: HttpMethod,
        /// Declared path template.
        path: String,
    },
}
