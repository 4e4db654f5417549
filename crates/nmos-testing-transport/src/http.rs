// crates/nmos-testing-transport/src/http.rs
// ============================================================================
// Module: HTTP Client
// Description: Blocking reqwest client implementing the HTTP seam.
// Purpose: Issue single requests with CORS request headers and bounded bodies.
// Dependencies: nmos-testing-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! [`ReqwestHttpClient`] issues one request per call with the CORS request
//! headers every conformance request carries. Responses are read up to a
//! configured byte limit. Failures classify into [`TransportError`] so the
//! crawler can grade them without inspecting reqwest types.
//!
//! Invariants:
//! - Redirects are followed up to the configured limit, then fail.
//! - Response bodies are capped at `max_response_bytes`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use nmos_testing_core::HttpClient;
use nmos_testing_core::HttpMethod;
use nmos_testing_core::HttpRequest;
use nmos_testing_core::HttpResponse;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::TransportError;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request header naming the verb being checked.
const REQUEST_METHOD_HEADER: &str = "Access-Control-Request-Method";
/// Request header naming the headers being checked.
const REQUEST_HEADERS_HEADER: &str = "Access-Control-Request-Headers";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// HTTP client limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum accepted response body size in bytes.
    pub max_response_bytes: usize,
    /// Maximum redirects followed before failing.
    pub max_redirects: usize,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_response_bytes: 4 * 1024 * 1024,
            max_redirects: 10,
            user_agent: concat!("nmos-testing/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking HTTP client for conformance requests.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    /// Underlying reqwest client.
    client: Client,
    /// Maximum accepted response body size.
    max_response_bytes: usize,
    /// Run log sink.
    log: Arc<dyn RunLog>,
}

impl ReqwestHttpClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the client cannot be built.
    pub fn new(config: &HttpClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
            log: Arc::new(NoopRunLog),
        })
    }

    /// Attaches a run log sink.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Reads the body, failing once it exceeds the configured limit.
    fn read_limited(&self, response: Response) -> Result<Vec<u8>, TransportError> {
        let max_bytes = u64::try_from(self.max_response_bytes).unwrap_or(u64::MAX);
        if response.content_length().is_some_and(|length| length > max_bytes) {
            return Err(TransportError::BodyTooLarge);
        }
        let mut limited = response.take(max_bytes.saturating_add(1));
        let mut bytes = Vec::new();
        limited.read_to_end(&mut bytes).map_err(|err| TransportError::Network(err.to_string()))?;
        if bytes.len() > self.max_response_bytes {
            return Err(TransportError::BodyTooLarge);
        }
        Ok(bytes)
    }

    /// Performs one request without logging its outcome.
    fn exchange(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), request.url.as_str())
            .header(REQUEST_METHOD_HEADER, request.method.as_str())
            .header(REQUEST_HEADERS_HEADER, "Content-Type");
        if let Some(body) = &request.body {
            let bytes =
                serde_json::to_vec(body).map_err(|err| TransportError::Network(err.to_string()))?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }
        let response = builder.send().map_err(|err| classify(&err))?;
        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let body = self.read_limited(response)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.record(
            &RunEvent::new("http_request", LogLevel::Debug, "http", request.method.as_str())
                .with_url(request.url.clone()),
        );
        self.exchange(request).inspect_err(|err| {
            self.log.record(
                &RunEvent::new("transport_failed", LogLevel::Warn, "http", err.to_string())
                    .with_url(request.url.clone()),
            );
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a request verb onto reqwest's method type.
fn reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Classifies a reqwest failure.
fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_redirect() {
        TransportError::TooManyRedirects
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Lower-cases header names and joins repeated values.
fn collect_headers(response: &Response) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    headers
}
