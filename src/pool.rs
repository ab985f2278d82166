//! Bounded worker pool
//!
//! Runs one unit of work per item with at most `limit` units in flight. Every
//! unit runs on its own tokio task, so a panic in one item becomes a failure
//! outcome for that item only. Results come back in completion order; callers
//! that need enumeration order sort by [`ItemResult::index`].
//!
//! Once the cancellation token fires or the deadline passes, no new units are
//! started. Units already running finish on their own, and every item that was
//! never started receives a failure outcome with zero attempts, so the number
//! of results always equals the number of items.

use crate::types::{Outcome, WorkItem};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason recorded for items that were never started
pub const NOT_DISPATCHED_REASON: &str = "cancelled before dispatch";

/// Terminal result for one item
#[derive(Clone, Debug)]
pub struct ItemResult {
    /// Position of the item in the enumeration
    pub index: usize,
    /// The item itself
    pub item: WorkItem,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Time spent in the unit of work (zero if never started)
    pub elapsed: Duration,
}

/// Fixed-size pool of concurrent units of work
#[derive(Clone, Debug)]
pub struct BoundedWorkerPool {
    limit: usize,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl BoundedWorkerPool {
    /// Create a pool running at most `limit` units at once (a limit of 0 is treated as 1)
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Stop dispatching when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Stop dispatching once `deadline` has elapsed since [`run`](Self::run) started
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Concurrency ceiling
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `unit_of_work` once for every item and wait until all are terminal
    pub async fn run<F, Fut>(&self, items: Vec<WorkItem>, unit_of_work: F) -> Vec<ItemResult>
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let started = Instant::now();
        let total = items.len();

        let results: Vec<ItemResult> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                // Evaluated when a slot frees up, i.e. at dispatch time
                let work = (!self.should_stop(started)).then(|| unit_of_work(item.clone()));

                async move {
                    let Some(work) = work else {
                        tracing::warn!(item_id = %item.id, index, "Item not dispatched, run is stopping");
                        return ItemResult {
                            index,
                            item,
                            outcome: Outcome::Failure {
                                reason: NOT_DISPATCHED_REASON.to_string(),
                                code: "cancelled".to_string(),
                                attempts: 0,
                            },
                            elapsed: Duration::ZERO,
                        };
                    };

                    let unit_started = Instant::now();
                    let outcome = match tokio::spawn(work).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(item_id = %item.id, error = %e, "Worker task panicked");
                            Outcome::Failure {
                                reason: format!("worker task failed: {}", e),
                                code: "internal_error".to_string(),
                                attempts: 1,
                            }
                        }
                    };
                    let elapsed = unit_started.elapsed();

                    match &outcome {
                        Outcome::Success { attempts, payload } => tracing::info!(
                            item_id = %item.id,
                            attempts,
                            bytes = payload.len(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Item succeeded"
                        ),
                        Outcome::Failure {
                            reason, attempts, ..
                        } => tracing::error!(
                            item_id = %item.id,
                            attempts,
                            reason = %reason,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Item failed"
                        ),
                    }

                    ItemResult {
                        index,
                        item,
                        outcome,
                        elapsed,
                    }
                }
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        debug_assert_eq!(results.len(), total);
        results
    }

    fn should_stop(&self, started: Instant) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| started.elapsed() >= d)
    }
}
