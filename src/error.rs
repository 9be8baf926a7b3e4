// Error types for UltiBust
// Transport failures stay inside the executor and never reach the run level

use thiserror::Error;

/// Invalid scan configuration, detected before any probe is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("no HTTP methods configured")]
    NoMethods,

    #[error("invalid HTTP method token: {0:?}")]
    UnknownMethod(String),

    #[error("backlog {backlog} is smaller than concurrency {concurrency}")]
    BacklogTooSmall { backlog: usize, concurrency: usize },

    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),
}

/// Transport-level failure of one attempt. Always retry-eligible.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("redirect error: {0}")]
    Redirect(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_redirect() {
            TransportError::Redirect(err.to_string())
        } else if err.is_builder() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            TransportError::InvalidUrl { url, reason: err.to_string() }
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Failure while writing the output sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output sink lock poisoned")]
    Poisoned,
}

/// Run-level error returned by the dispatcher.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
}
