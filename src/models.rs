// Core data models for UltiBust
// Probe requests, attempt outcomes and the terminal result rows

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Sentinel written for status and length when no response was ever received.
pub const SENTINEL: i64 = -1;

/// HTTP method of a probe. Extension verbs such as `PROPFIND` are kept as
/// upper-cased tokens so verb tampering lists work unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
    CONNECT,
    TRACE,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Custom(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    /// Names are upper-cased. Anything that is not a valid HTTP token is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        match name.as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "OPTIONS" => Ok(Method::OPTIONS),
            "HEAD" => Ok(Method::HEAD),
            "CONNECT" => Ok(Method::CONNECT),
            "TRACE" => Ok(Method::TRACE),
            _ => {
                if name.is_empty() || reqwest::Method::from_bytes(name.as_bytes()).is_err() {
                    return Err(ConfigError::UnknownMethod(name));
                }
                Ok(Method::Custom(name))
            }
        }
    }
}

/// Header fuzzing input: every value is tried in every named header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzSpec {
    pub header_names: Vec<String>,
    pub values: Vec<String>,
}

impl FuzzSpec {
    pub fn new(header_names: Vec<String>, values: Vec<String>) -> Self {
        Self { header_names, values }
    }

    /// Fuzzing only happens when both lists are non-empty.
    pub fn is_active(&self) -> bool {
        !self.header_names.is_empty() && !self.values.is_empty()
    }

    /// Number of variants produced per base combination.
    pub fn width(&self) -> usize {
        if self.is_active() {
            self.header_names.len() * self.values.len()
        } else {
            1
        }
    }
}

/// One fully expanded probe. Immutable once built by the expander.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub host: String,
    pub path: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub fuzzed_header: Option<String>,
    pub fuzzed_value: Option<String>,
}

impl ProbeRequest {
    /// Build a request, trimming the trailing slash of the host and the
    /// surrounding slashes of the path.
    pub fn new(host: &str, path: &str, method: Method, headers: BTreeMap<String, String>) -> Self {
        Self {
            host: host.trim().trim_end_matches('/').to_string(),
            path: path.trim().trim_matches('/').to_string(),
            method,
            headers,
            fuzzed_header: None,
            fuzzed_value: None,
        }
    }

    /// Override one header with a fuzz value, remembering which one was fuzzed.
    pub fn with_fuzzed_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.to_string());
        self.fuzzed_header = Some(name.to_string());
        self.fuzzed_value = Some(value.to_string());
        self
    }

    /// Full target URL: `<host>/<path>`.
    pub fn url(&self) -> String {
        format!("{}/{}", self.host, self.path)
    }
}

/// Classified outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success {
        status_code: u16,
        content_length: usize,
        elapsed: Duration,
        recorded_headers: BTreeMap<String, Option<String>>,
        content_hash: Option<String>,
    },
    TransportFailure {
        elapsed: Duration,
    },
    Throttled {
        status_code: u16,
        content_length: usize,
        elapsed: Duration,
        recorded_headers: BTreeMap<String, Option<String>>,
    },
}

impl ProbeOutcome {
    pub fn status_code(&self) -> i64 {
        match self {
            ProbeOutcome::Success { status_code, .. } | ProbeOutcome::Throttled { status_code, .. } => {
                i64::from(*status_code)
            }
            ProbeOutcome::TransportFailure { .. } => SENTINEL,
        }
    }

    pub fn content_length(&self) -> i64 {
        match self {
            ProbeOutcome::Success { content_length, .. }
            | ProbeOutcome::Throttled { content_length, .. } => *content_length as i64,
            ProbeOutcome::TransportFailure { .. } => SENTINEL,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            ProbeOutcome::Success { elapsed, .. }
            | ProbeOutcome::TransportFailure { elapsed }
            | ProbeOutcome::Throttled { elapsed, .. } => *elapsed,
        }
    }
}

/// Terminal record for one probe. Written exactly once per `ProbeRequest`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub host: String,
    pub path: String,
    pub method: Method,
    pub url: String,
    pub status_code: i64,
    pub content_length: i64,
    pub elapsed_seconds: f64,
    pub content_hash: Option<String>,
    pub recorded_response_headers: BTreeMap<String, Option<String>>,
    pub fuzzed_header: Option<String>,
    pub fuzzed_value: Option<String>,
    pub attempts: u32,
    /// Set when the probe stopped on a retryable outcome because the budget ran out.
    pub retries_exhausted: bool,
}

impl ProbeResult {
    /// Final row for `request` from the last seen outcome.
    pub fn from_outcome(
        request: &ProbeRequest,
        outcome: ProbeOutcome,
        recorded_names: &[String],
        attempts: u32,
    ) -> Self {
        let status_code = outcome.status_code();
        let content_length = outcome.content_length();
        let elapsed_seconds = outcome.elapsed().as_secs_f64();
        let (recorded, content_hash) = match outcome {
            ProbeOutcome::Success { recorded_headers, content_hash, .. } => (recorded_headers, content_hash),
            ProbeOutcome::Throttled { recorded_headers, .. } => (recorded_headers, None),
            ProbeOutcome::TransportFailure { .. } => (BTreeMap::new(), None),
        };
        let mut result = Self::sentinel(request, recorded_names, attempts);
        result.status_code = status_code;
        result.content_length = content_length;
        result.elapsed_seconds = elapsed_seconds;
        result.content_hash = content_hash;
        for (name, value) in recorded {
            result.recorded_response_headers.insert(name, value);
        }
        result
    }

    /// Degraded row used when nothing was captured at all.
    pub fn sentinel(request: &ProbeRequest, recorded_names: &[String], attempts: u32) -> Self {
        let url = request.url();
        let (host, path) = split_url(&url, request);
        Self {
            host,
            path,
            method: request.method.clone(),
            url,
            status_code: SENTINEL,
            content_length: SENTINEL,
            elapsed_seconds: 0.0,
            content_hash: None,
            recorded_response_headers: recorded_names.iter().map(|n| (n.clone(), None)).collect(),
            fuzzed_header: request.fuzzed_header.clone(),
            fuzzed_value: request.fuzzed_value.clone(),
            attempts,
            retries_exhausted: false,
        }
    }
}

/// Hostname and path as reported in the output, e.g. `a.test` and `/admin`.
/// The path is taken verbatim from the request so unresolved `{name}` tokens
/// are not percent-encoded; any query or fragment is dropped.
fn split_url(url: &str, request: &ProbeRequest) -> (String, String) {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| request.host.clone());
    let path = request.path.split(['?', '#']).next().unwrap_or_default();
    (host, format!("/{}", path))
}
