// Shared helpers for integration tests: an in-memory sink and a scripted transport

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use ultibust::engine::{Transport, TransportResponse};
use ultibust::error::TransportError;
use ultibust::models::Method;

/// Cloneable `Write` target whose contents can be read back after a run.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn boxed(&self) -> Box<dyn Write + Send> {
        Box::new(self.clone())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails, for sink error paths.
pub struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn response(status_code: u16, body: &str) -> TransportResponse {
    TransportResponse {
        status_code,
        body: body.as_bytes().to_vec(),
        elapsed: Duration::from_millis(5),
        headers: Vec::new(),
    }
}

type Script = dyn Fn(&str, u32) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Transport driven by a closure of (url, attempt number for that url).
pub struct ScriptedTransport {
    script: Box<Script>,
    latency: Duration,
    calls: Mutex<HashMap<String, u32>>,
    sends: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, u32) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            sends: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Times at which `url` was sent, in order.
    pub fn send_times(&self, url: &str) -> Vec<Instant> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _method: &Method,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> Result<TransportResponse, TransportError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.sends.lock().unwrap().push((url.to_string(), Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(url, attempt)
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
