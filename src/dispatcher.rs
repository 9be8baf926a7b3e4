// Bounded dispatch for UltiBust
// Fans probes out to tokio tasks, at most `backlog` admitted at once, and feeds
// every terminal result into the aggregator exactly once.

use futures::FutureExt;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{RunContext, ScanConfig};
use crate::engine::Transport;
use crate::error::{ScanError, SinkError};
use crate::executor::ProbeExecutor;
use crate::expander::expand;
use crate::models::{ProbeRequest, ProbeResult};
use crate::reporting::{OutputSchema, ResultAggregator};

/// Counts reported when a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub submitted: usize,
    pub completed: u64,
    /// True when a shutdown signal stopped new probes from being admitted.
    pub drained: bool,
}

pub struct Dispatcher {
    executor: Arc<ProbeExecutor>,
    aggregator: Arc<ResultAggregator>,
    backlog: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Dispatcher {
    pub fn new(executor: Arc<ProbeExecutor>, aggregator: Arc<ResultAggregator>, backlog: usize) -> Self {
        Self {
            executor,
            aggregator,
            backlog: backlog.max(1),
            shutdown: None,
        }
    }

    /// Stop admitting probes once `true` is sent; in-flight probes still finish.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub async fn run(&self, requests: Vec<ProbeRequest>) -> Result<RunSummary, ScanError> {
        let total = requests.len();
        let mut pending = requests.into_iter();
        let mut tasks: JoinSet<Result<u64, SinkError>> = JoinSet::new();
        let mut shutdown = self.shutdown.clone();
        let mut first_error: Option<SinkError> = None;
        let mut submitted = 0usize;
        let mut drained = false;

        loop {
            if !drained && shutdown.as_ref().map_or(false, |rx| *rx.borrow()) {
                drained = true;
                info!("Shutdown requested, waiting for {} in-flight probes", tasks.len());
            }
            let admitting = !drained && first_error.is_none();
            while admitting && tasks.len() < self.backlog {
                match pending.next() {
                    Some(request) => {
                        self.spawn_probe(&mut tasks, request);
                        submitted += 1;
                    }
                    None => break,
                }
            }
            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = shutdown_signal(&mut shutdown), if !drained => continue,
            };

            match joined {
                Some(Ok(Ok(_))) => {}
                Some(Ok(Err(err))) => {
                    error!("Failed to write result: {}", err);
                    first_error.get_or_insert(err);
                }
                Some(Err(join_err)) => warn!("Probe task did not complete: {}", join_err),
                None => break,
            }
        }

        if let Some(err) = first_error {
            return Err(err.into());
        }
        let completed = self.aggregator.finish()?;
        Ok(RunSummary { total, submitted, completed, drained })
    }

    fn spawn_probe(&self, tasks: &mut JoinSet<Result<u64, SinkError>>, request: ProbeRequest) {
        let executor = Arc::clone(&self.executor);
        let aggregator = Arc::clone(&self.aggregator);
        tasks.spawn(async move {
            let result = match AssertUnwindSafe(executor.execute(&request)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!("{} {} probe panicked, recording empty result", request.method, request.url());
                    ProbeResult::sentinel(&request, &executor.context().record_headers, 1)
                }
            };
            aggregator.record(&result)
        });
    }
}

/// Resolves once the watched flag turns `true`; never resolves without a channel.
async fn shutdown_signal(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Expand the inputs and run every probe, writing rows to `sink`.
pub async fn run_scan(
    config: &ScanConfig,
    hosts: &[String],
    paths: &[String],
    transport: Arc<dyn Transport>,
    sink: Box<dyn Write + Send>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary, ScanError> {
    config.validate()?;

    let requests = expand(
        hosts,
        paths,
        &config.methods,
        &config.params,
        &config.headers,
        Some(&config.fuzz),
        config.dedup,
    );
    info!("Expanded {} probes", requests.len());

    let context = Arc::new(RunContext::new(config, requests.len()));
    let schema = OutputSchema::new(&context, config.fuzz.is_active());
    let aggregator = Arc::new(ResultAggregator::new(sink, schema, config.format, requests.len())?);
    let executor = Arc::new(ProbeExecutor::new(transport, context, config.concurrency));

    let mut dispatcher = Dispatcher::new(executor, aggregator, config.effective_backlog());
    if let Some(rx) = shutdown {
        dispatcher = dispatcher.with_shutdown(rx);
    }
    dispatcher.run(requests).await
}
