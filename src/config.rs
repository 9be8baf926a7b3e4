// Scan configuration for UltiBust
// Everything arrives pre-parsed; RunContext freezes it before dispatch begins

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{FuzzSpec, Method};
use crate::retry::RetryPolicy;

pub const DEFAULT_METHODS: &str = "OPTIONS,GET,POST,PUT,PATCH,DELETE,HEAD,CONNECT,TRACE";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_THROTTLE_STATUS: u16 = 529;
pub const DEFAULT_SLEEP_SECS: u64 = 30;
pub const DEFAULT_BACKOFF_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Probes admitted per send slot when no explicit backlog is set.
const BACKLOG_FACTOR: usize = 4;

/// Output encoding for result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    JsonLines,
}

/// User-facing knobs for a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub concurrency: usize,
    pub backlog: Option<usize>,
    pub methods: Vec<Method>,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub fuzz: FuzzSpec,
    pub dedup: bool,
    pub record_headers: Vec<String>,
    pub content_hash: bool,
    pub throttle_status: u16,
    pub throttle_body_marker: Option<String>,
    pub base_sleep: Duration,
    pub backoff_increment: Duration,
    pub max_retries: i64,
    pub timeout: Duration,
    pub insecure: bool,
    pub format: OutputFormat,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            backlog: None,
            methods: DEFAULT_METHODS
                .split(',')
                .filter_map(|m| m.parse().ok())
                .collect(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            fuzz: FuzzSpec::default(),
            dedup: false,
            record_headers: Vec::new(),
            content_hash: false,
            throttle_status: DEFAULT_THROTTLE_STATUS,
            throttle_body_marker: None,
            base_sleep: Duration::from_secs(DEFAULT_SLEEP_SECS),
            backoff_increment: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
            format: OutputFormat::Csv,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }
        if let Some(backlog) = self.backlog {
            if backlog < self.concurrency {
                return Err(ConfigError::BacklogTooSmall { backlog, concurrency: self.concurrency });
            }
        }
        let names = self
            .headers
            .keys()
            .chain(self.fuzz.header_names.iter())
            .chain(self.record_headers.iter());
        for name in names {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::InvalidHeaderName(name.clone()));
            }
        }
        Ok(())
    }

    /// Admitted probes (sending plus backing off) at any one time.
    pub fn effective_backlog(&self) -> usize {
        self.backlog
            .unwrap_or(self.concurrency.saturating_mul(BACKLOG_FACTOR))
            .max(self.concurrency)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_sleep, self.backoff_increment, self.throttle_status)
    }

    /// Recorded header names, lower-cased, first occurrence wins.
    pub fn normalized_record_headers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in &self.record_headers {
            let lower = name.trim().to_ascii_lowercase();
            if !lower.is_empty() && !names.contains(&lower) {
                names.push(lower);
            }
        }
        names
    }
}

/// Read-only state shared by every probe of a run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub retry: RetryPolicy,
    pub record_headers: Vec<String>,
    pub content_hash: bool,
    pub throttle_body_marker: Option<String>,
    pub total: usize,
}

impl RunContext {
    pub fn new(config: &ScanConfig, total: usize) -> Self {
        Self {
            retry: config.retry_policy(),
            record_headers: config.normalized_record_headers(),
            content_hash: config.content_hash,
            throttle_body_marker: config.throttle_body_marker.clone().filter(|m| !m.is_empty()),
            total,
        }
    }
}
