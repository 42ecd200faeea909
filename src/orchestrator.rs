//! Classifier Orchestrator (C8): validates incoming batches, admits them
//! under a concurrency cap, delegates to the AI client, and applies the
//! graceful-degradation fallback whenever the upstream call comes back
//! anything other than a clean, length-matching success.
//!
//! The admission gate is a `tokio::sync::Semaphore` wrapped in
//! `tokio::time::timeout`, applying a bounded-concurrency idiom to the
//! sidecar's whole-request admission control.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::ai_client::{AiClient, AiClientError, ItemOutcome};
use crate::config::Config;
use crate::metrics::SharedMetrics;
use crate::types::{Batch, Category, Classification, ForwardTo, SortedItem};

/// Max wait for an admission slot before failing fast with `Overloaded`.
/// Not separately configurable; the default behavior is immediate rejection.
const ADMISSION_WAIT: std::time::Duration = std::time::Duration::ZERO;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("batch must contain at least one item")]
    EmptyBatch,
    #[error("batch exceeds maximum size of {0} items")]
    BatchTooLarge(usize),
    #[error("too many in-flight requests, try again later")]
    Overloaded,
}

pub struct Orchestrator {
    config: Arc<Config>,
    ai_client: Arc<AiClient>,
    metrics: SharedMetrics,
    admission: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, ai_client: Arc<AiClient>, metrics: SharedMetrics) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Self {
            config,
            ai_client,
            metrics,
            admission,
        }
    }

    fn validate(&self, batch: &Batch) -> Result<(), OrchestratorError> {
        if batch.items.is_empty() {
            return Err(OrchestratorError::EmptyBatch);
        }
        if batch.items.len() > self.config.max_batch_size {
            return Err(OrchestratorError::BatchTooLarge(self.config.max_batch_size));
        }
        Ok(())
    }

    pub async fn sort(&self, batch: Batch) -> Result<Vec<SortedItem>, OrchestratorError> {
        self.validate(&batch)?;

        let permit = match tokio::time::timeout(ADMISSION_WAIT, self.admission.clone().acquire_owned()).await {
            Ok(permit) => permit.expect("semaphore never closed"),
            Err(_) => {
                self.metrics.inc_requests_total("rejected");
                return Err(OrchestratorError::Overloaded);
            }
        };

        let guard = ActiveRequestGuard::new(&self.metrics);
        let deadline = Instant::now() + self.config.request_deadline;

        let outcome = self.ai_client.classify(&batch.items, deadline).await;
        drop(permit);
        drop(guard);

        let classifications = match outcome {
            Ok(per_item) => {
                self.metrics.inc_requests_total("ok");
                per_item
                    .into_iter()
                    .map(|o| match o {
                        ItemOutcome::Classified(c) => c,
                        ItemOutcome::FallbackNeeded => Classification::fallback(),
                    })
                    .collect::<Vec<_>>()
            }
            Err(AiClientError::CircuitOpen) => {
                warn!("upstream call short-circuited: circuit open, serving fallback");
                self.metrics.inc_api_calls_total("short_circuited");
                self.metrics.inc_requests_total("ok");
                fallback_for_all(batch.items.len())
            }
            Err(AiClientError::RateLimited) => {
                warn!("upstream call short-circuited: rate limit wait exceeded, serving fallback");
                self.metrics.inc_api_calls_total("short_circuited");
                self.metrics.inc_requests_total("ok");
                fallback_for_all(batch.items.len())
            }
            Err(AiClientError::UpstreamTimeout) => {
                warn!("upstream call short-circuited: timed out, serving fallback");
                self.metrics.inc_api_calls_total("short_circuited");
                self.metrics.inc_requests_total("ok");
                fallback_for_all(batch.items.len())
            }
            Err(err) => {
                warn!(error = %err, "upstream call failed, serving fallback");
                self.metrics.inc_requests_total("error");
                fallback_for_all(batch.items.len())
            }
        };

        let results = batch
            .items
            .into_iter()
            .zip(classifications.into_iter())
            .map(|(item, classification)| {
                let classification = classification.normalized();
                self.metrics
                    .inc_items_classified(category_label(classification.category));
                SortedItem {
                    item,
                    category: classification.category,
                    forward_to: classification.forward_to,
                }
            })
            .collect();

        Ok(results)
    }
}

fn fallback_for_all(len: usize) -> Vec<Classification> {
    (0..len).map(|_| Classification::fallback()).collect()
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::Critical => "critical",
        Category::Warning => "warning",
        Category::Info => "info",
    }
}

/// RAII guard mirroring the mutex-guard idiom already used for the rate
/// limiter and circuit breaker: the active-requests gauge always drops back
/// down, even if the handler returns early via `?`.
struct ActiveRequestGuard<'a> {
    metrics: &'a SharedMetrics,
}

impl<'a> ActiveRequestGuard<'a> {
    fn new(metrics: &'a SharedMetrics) -> Self {
        metrics.inc_active_requests();
        Self { metrics }
    }
}

impl Drop for ActiveRequestGuard<'_> {
    fn drop(&mut self) {
        self.metrics.dec_active_requests();
    }
}
