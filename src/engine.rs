// Async HTTP engine for UltiBust
// Uses reqwest and tokio; redirects are never followed

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::models::Method;

/// Raw response handed back by a transport.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
    pub elapsed: Duration,
    /// Header names lower-cased; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
}

impl TransportResponse {
    /// All values of `name` joined with `", "`, or `None` when absent.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

/// Sends one request. Implementations must not follow redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: &Method,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<TransportResponse, TransportError>;
}

pub struct HttpEngine {
    pub client: Client,
}

impl HttpEngine {
    pub fn new(timeout: Duration, insecure: bool, pool_size: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .pool_max_idle_per_host(pool_size)
            .build()?;
        Ok(Self { client })
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Other(format!("header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Other(format!("header value for {}: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpEngine {
    async fn send(
        &self,
        method: &Method,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let header_map = to_header_map(headers)?;
        debug!(?header_map, "{} {}", method, url);

        let started = Instant::now();
        let resp = self.client.request(method, url).headers(header_map).send().await?;
        let status_code = resp.status().as_u16();
        let response_headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = resp.bytes().await?.to_vec();

        Ok(TransportResponse {
            status_code,
            body,
            elapsed: started.elapsed(),
            headers: response_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_headers_are_joined() {
        let resp = TransportResponse {
            headers: vec![
                ("set-cookie".to_string(), "a=1".to_string()),
                ("server".to_string(), "nginx".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
            ],
            ..TransportResponse::default()
        };
        assert_eq!(resp.header("Set-Cookie").as_deref(), Some("a=1, b=2"));
        assert_eq!(resp.header("server").as_deref(), Some("nginx"));
        assert_eq!(resp.header("x-powered-by"), None);
    }

    #[test]
    fn test_bad_header_value_is_transport_error() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Test".to_string(), "bad\nvalue".to_string());
        assert!(matches!(to_header_map(&headers), Err(TransportError::Other(_))));
    }
}
