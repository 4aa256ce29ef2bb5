//! Supervised background metrics recomputation.
//!
//! The Metrics Engine is CPU-bound, so each recomputation runs on tokio's
//! blocking pool with a hard timeout. Timeouts and panics count as failures;
//! after `max_restarts` consecutive failures the supervisor stops spawning
//! and reports metrics as unavailable until [`MetricsSupervisor::reset`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::MetricsError;
use crate::graph::Graph;
use crate::graph::analytics::{
    CancelToken, Enrichment, MetricsConfig, MetricsResult, enrich, panic_message,
};

/// Whether metrics can currently be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum MetricsAvailability {
    Available,
    /// Recent jobs failed but the supervisor is still retrying.
    Degraded { consecutive_failures: usize },
    Unavailable,
}

#[derive(Debug)]
pub struct MetricsSupervisor {
    timeout: Duration,
    max_restarts: usize,
    consecutive_failures: usize,
    inflight: Option<CancelToken>,
}

impl MetricsSupervisor {
    pub fn new(timeout: Duration, max_restarts: usize) -> Self {
        Self {
            timeout,
            max_restarts: max_restarts.max(1),
            consecutive_failures: 0,
            inflight: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn availability(&self) -> MetricsAvailability {
        match self.consecutive_failures {
            0 => MetricsAvailability::Available,
            n if n >= self.max_restarts => MetricsAvailability::Unavailable,
            n => MetricsAvailability::Degraded {
                consecutive_failures: n,
            },
        }
    }

    /// Start enriching `graph` on the blocking pool, cancelling any job still
    /// in flight.
    pub fn spawn(
        &mut self,
        graph: Arc<Graph>,
        config: MetricsConfig,
        generation: u64,
    ) -> MetricsResult<EnrichmentJob> {
        self.spawn_task(generation, move |cancel| enrich(&graph, &config, &cancel))
    }

    pub(crate) fn spawn_task<F>(&mut self, generation: u64, task: F) -> MetricsResult<EnrichmentJob>
    where
        F: FnOnce(CancelToken) -> MetricsResult<Enrichment> + Send + 'static,
    {
        if self.availability() == MetricsAvailability::Unavailable {
            return Err(MetricsError::Unavailable {
                failures: self.consecutive_failures,
            });
        }
        self.cancel_inflight();

        let cancel = CancelToken::new();
        self.inflight = Some(cancel.clone());
        let handle = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || task(cancel)
        });
        tracing::debug!(generation, "metrics job spawned");

        Ok(EnrichmentJob {
            generation,
            cancel,
            handle,
            timeout: self.timeout,
        })
    }

    /// Account for a finished job. Cancellation is neutral; success clears
    /// the failure count.
    pub fn record<T>(&mut self, outcome: &MetricsResult<T>) {
        self.inflight = None;
        match outcome {
            Ok(_) => self.consecutive_failures = 0,
            Err(MetricsError::Cancelled) => {}
            Err(err) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_restarts {
                    tracing::error!(
                        failures = self.consecutive_failures,
                        error = %err,
                        "metrics supervisor giving up"
                    );
                } else {
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        error = %err,
                        "metrics job failed, will retry on next mutation"
                    );
                }
            }
        }
    }

    /// Make metrics available again after the supervisor gave up.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn cancel_inflight(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
    }
}

/// A running recomputation tagged with the mutation generation it serves.
#[derive(Debug)]
pub struct EnrichmentJob {
    generation: u64,
    cancel: CancelToken,
    handle: JoinHandle<MetricsResult<Enrichment>>,
    timeout: Duration,
}

impl EnrichmentJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the result, at most the supervisor's timeout.
    ///
    /// On timeout the job is told to stop and [`MetricsError::Timeout`] is
    /// returned; a panic inside the job becomes [`MetricsError::WorkerCrashed`].
    pub async fn wait(self) -> MetricsResult<Enrichment> {
        let EnrichmentJob {
            cancel,
            handle,
            timeout,
            ..
        } = self;
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => Err(MetricsError::WorkerCrashed {
                message: panic_message(&*join.into_panic()),
            }),
            Ok(Err(join)) => Err(MetricsError::WorkerCrashed {
                message: join.to_string(),
            }),
            Err(_) => {
                cancel.cancel();
                Err(MetricsError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }
}
