// Probe execution for UltiBust
// Sends one probe, classifies each attempt and loops through the retry policy
// until a single terminal result exists.
//
// Send slots: the transport call holds one permit of a semaphore sized to the
// configured concurrency. The permit is released before any backoff sleep, so a
// throttled probe waiting out its delay never occupies a connection slot.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RunContext;
use crate::engine::{Transport, TransportResponse};
use crate::error::TransportError;
use crate::models::{ProbeOutcome, ProbeRequest, ProbeResult};
use crate::retry::Action;

pub struct ProbeExecutor {
    transport: Arc<dyn Transport>,
    context: Arc<RunContext>,
    send_slots: Arc<Semaphore>,
}

impl ProbeExecutor {
    pub fn new(transport: Arc<dyn Transport>, context: Arc<RunContext>, concurrency: usize) -> Self {
        Self {
            transport,
            context,
            send_slots: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Run `request` to its terminal result. Never fails: transport errors end
    /// up as sentinel values once the retry budget is spent.
    pub async fn execute(&self, request: &ProbeRequest) -> ProbeResult {
        let url = request.url();
        let policy = &self.context.retry;
        let mut attempt_number: u32 = 1;

        loop {
            let (outcome, error) = self.attempt(request, &url).await;
            match policy.decide(&outcome, attempt_number) {
                Action::GiveUp => {
                    let mut result = ProbeResult::from_outcome(
                        request,
                        outcome.clone(),
                        &self.context.record_headers,
                        attempt_number,
                    );
                    result.retries_exhausted = policy.is_retryable(&outcome);
                    return result;
                }
                Action::RetryImmediately => {
                    let reason = error.map(|e| e.to_string()).unwrap_or_default();
                    info!("{} {} transport error: {}, trying again", request.method, url, reason);
                }
                Action::RetryAfter(delay) => {
                    if outcome.status_code() == i64::from(policy.throttle_code) {
                        info!(
                            "{} {} received throttle status code {}, sleeping for {} seconds",
                            url,
                            request.method,
                            outcome.status_code(),
                            delay.as_secs_f64()
                        );
                    } else {
                        info!(
                            "{} {} throttled (status {}, body marker), sleeping for {} seconds",
                            url,
                            request.method,
                            outcome.status_code(),
                            delay.as_secs_f64()
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
            }
            attempt_number = attempt_number.saturating_add(1);
        }
    }

    async fn attempt(&self, request: &ProbeRequest, url: &str) -> (ProbeOutcome, Option<TransportError>) {
        // The semaphore is never closed; a missing permit only means no slot accounting.
        let permit = self.send_slots.acquire().await.ok();
        let started = Instant::now();
        let sent = self.transport.send(&request.method, url, &request.headers).await;
        drop(permit);

        match sent {
            Ok(response) => {
                debug!("{} {} -> {} in {:?}", request.method, url, response.status_code, response.elapsed);
                (self.classify(response), None)
            }
            Err(err) => {
                debug!("{} {} failed: {}", request.method, url, err);
                (ProbeOutcome::TransportFailure { elapsed: started.elapsed() }, Some(err))
            }
        }
    }

    fn classify(&self, response: TransportResponse) -> ProbeOutcome {
        let recorded_headers = self.recorded_headers(&response);
        let throttled = response.status_code == self.context.retry.throttle_code
            || self
                .context
                .throttle_body_marker
                .as_deref()
                .map_or(false, |marker| contains_marker(&response.body, marker));

        if throttled {
            return ProbeOutcome::Throttled {
                status_code: response.status_code,
                content_length: response.body.len(),
                elapsed: response.elapsed,
                recorded_headers,
            };
        }

        let content_hash = if self.context.content_hash && !response.body.is_empty() {
            Some(content_digest(&response.body))
        } else {
            None
        };

        ProbeOutcome::Success {
            status_code: response.status_code,
            content_length: response.body.len(),
            elapsed: response.elapsed,
            recorded_headers,
            content_hash,
        }
    }

    /// Every configured name is present; absent headers map to `None`.
    fn recorded_headers(&self, response: &TransportResponse) -> BTreeMap<String, Option<String>> {
        self.context
            .record_headers
            .iter()
            .map(|name| (name.clone(), response.header(name)))
            .collect()
    }
}

fn contains_marker(body: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    !marker.is_empty() && body.windows(marker.len()).any(|w| w == marker)
}

/// Hex SHA-256 of the body, used only to compare responses.
pub fn content_digest(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}
