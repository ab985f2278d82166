//! Run orchestration
//!
//! A [`RunOrchestrator`] drives one run of one pipeline through the
//! [`RunState`] machine:
//!
//! ```text
//! Init -> SourceResolved -> Dispatched -> Aggregated -> Reported -> Done
//!   \              \
//!    -> Failed      -> AbortedEarly
//! ```
//!
//! Transitions only move forward. The orchestrator itself never retries;
//! retrying happens per item inside the worker pool.

use crate::aggregate::ResultAggregator;
use crate::error::{Error, Result};
use crate::output::{ensure_dir, unique_file_name, write_atomic};
use crate::pipelines::Pipeline;
use crate::pool::BoundedWorkerPool;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, RetryingClient};
use crate::source::WorkItemSource;
use crate::types::{Outcome, RunContext, RunState, RunSummary, WorkItem};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// What a finished run produced
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Terminal state (`Done` or `AbortedEarly`)
    pub state: RunState,
    /// Run date the artifacts were written under
    pub run_date: String,
    /// Counts and failures
    pub summary: RunSummary,
    /// Directory holding the artifacts (none when the run aborted early)
    pub output_dir: Option<PathBuf>,
    /// Combined artifact path (none when the run aborted early)
    pub combined_path: Option<PathBuf>,
    /// Per-item artifact paths, in enumeration order
    pub item_paths: Vec<PathBuf>,
}

/// Drives one pipeline run from enumeration to the written artifacts
pub struct RunOrchestrator {
    ctx: Arc<RunContext>,
    state: RunState,
    retry: RetryingClient,
    rate_limiter: RateLimiter,
}

impl RunOrchestrator {
    /// Create an orchestrator whose retry and pacing follow the context's settings
    pub fn new(ctx: RunContext) -> Self {
        let retry = RetryingClient::new(RetryPolicy::from(&ctx.retry));
        let rate_limiter = RateLimiter::new(&ctx.rate_limit);
        Self {
            ctx: ctx.shared(),
            state: RunState::Init,
            retry,
            rate_limiter,
        }
    }

    /// Replace the retrying client (tests inject a fake sleeper through it)
    pub fn with_retry_client(mut self, retry: RetryingClient) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the rate limiter
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The run context
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::Other(format!(
                "illegal run state transition {} -> {}",
                self.state, next
            )));
        }
        debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
        Ok(())
    }

    /// Execute the run
    ///
    /// Returns [`Error::Enumeration`] (after moving to `Failed`) when the
    /// source cannot list items at all. Zero items ends the run in
    /// `AbortedEarly` without creating any output. Otherwise every item is
    /// processed, each success is written to its own file, the combined
    /// artifact is written, and the summary is logged.
    ///
    /// An item whose file cannot be written is reported as failed and left
    /// out of the combined artifact. Failing to create the output directory
    /// or to write the combined artifact ends the run with an error.
    pub async fn run<P: Pipeline>(
        &mut self,
        source: &dyn WorkItemSource,
        pipeline: Arc<P>,
    ) -> Result<RunReport> {
        if self.state != RunState::Init {
            return Err(Error::Other(format!(
                "orchestrator already used (state {})",
                self.state
            )));
        }

        let started = Instant::now();
        info!(
            pipeline = pipeline.name(),
            run_date = %self.ctx.run_date,
            concurrency = self.ctx.concurrency,
            "Run starting"
        );

        let items = match source.enumerate(&self.ctx).await {
            Ok(items) => items,
            Err(e) => {
                self.advance(RunState::Failed)?;
                error!(pipeline = pipeline.name(), error = %e, "Enumeration failed, aborting run");
                return Err(match e {
                    Error::Enumeration(_) => e,
                    other => Error::Enumeration(other.to_string()),
                });
            }
        };
        self.advance(RunState::SourceResolved)?;

        if items.is_empty() {
            self.advance(RunState::AbortedEarly)?;
            warn!(
                pipeline = pipeline.name(),
                run_date = %self.ctx.run_date,
                "No items found, nothing to do"
            );
            return Ok(RunReport {
                state: self.state,
                run_date: self.ctx.run_date.clone(),
                summary: RunSummary {
                    elapsed: started.elapsed(),
                    ..RunSummary::default()
                },
                output_dir: None,
                combined_path: None,
                item_paths: Vec::new(),
            });
        }

        let mut results = self.dispatch(items, &pipeline).await;
        self.advance(RunState::Dispatched)?;

        let output_dir = self.ctx.output_dir(pipeline.category());
        ensure_dir(&output_dir).await?;

        let combined_name = pipeline.combined_file_name(&self.ctx.run_date);
        let mut taken = HashSet::from([combined_name.clone()]);
        results.sort_by_key(|r| r.index);

        let mut item_paths = Vec::new();
        for result in results.iter_mut() {
            let Some(payload) = result.outcome.payload() else {
                continue;
            };
            let wanted = pipeline.item_file_name(&result.item);
            let name = unique_file_name(&wanted, &mut taken);
            if name != wanted {
                warn!(
                    item_id = %result.item.id,
                    wanted = %wanted,
                    written = %name,
                    "File name already taken in this run, using a suffixed name"
                );
            }

            let path = output_dir.join(name);
            let written = write_atomic(&path, payload.as_bytes()).await;
            match written {
                Ok(()) => item_paths.push(path),
                Err(e) => {
                    error!(
                        item_id = %result.item.id,
                        path = %path.display(),
                        error = %e,
                        "Failed to write item artifact"
                    );
                    result.outcome = Outcome::Failure {
                        reason: format!("failed to write {}: {}", path.display(), e),
                        code: e.error_code().to_string(),
                        attempts: result.outcome.attempts(),
                    };
                }
            }
        }

        let aggregator = ResultAggregator::new(pipeline.framing());
        let (artifact, summary) = aggregator.aggregate(
            &results,
            |item, payload| pipeline.combined_fragment(item, payload),
            started.elapsed(),
        );
        self.advance(RunState::Aggregated)?;

        let combined_path = output_dir.join(combined_name);
        write_atomic(&combined_path, artifact.content.as_bytes()).await?;
        self.advance(RunState::Reported)?;

        if !summary.failures.is_empty() {
            let failed_ids: Vec<&str> = summary.failures.iter().map(|f| f.id.as_str()).collect();
            warn!(pipeline = pipeline.name(), failed = ?failed_ids, "Some items failed");
        }
        info!(
            pipeline = pipeline.name(),
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            output_dir = %output_dir.display(),
            combined = %combined_path.display(),
            "Run complete"
        );

        self.advance(RunState::Done)?;
        Ok(RunReport {
            state: self.state,
            run_date: self.ctx.run_date.clone(),
            summary,
            output_dir: Some(output_dir),
            combined_path: Some(combined_path),
            item_paths,
        })
    }

    async fn dispatch<P: Pipeline>(
        &self,
        items: Vec<WorkItem>,
        pipeline: &Arc<P>,
    ) -> Vec<crate::pool::ItemResult> {
        let pool = BoundedWorkerPool::new(self.ctx.concurrency)
            .with_cancellation(self.ctx.cancel.clone())
            .with_deadline(self.ctx.deadline);

        pool.run(items, |item| {
            let pipeline = Arc::clone(pipeline);
            let retry = self.retry.clone();
            let limiter = self.rate_limiter.clone();

            async move {
                if pipeline.throttled() {
                    limiter.throttle().await;
                }

                let label = item.id.to_string();
                let attempted = retry.execute(&label, || pipeline.process(&item)).await;
                match attempted.result {
                    Ok(payload) => Outcome::Success {
                        payload,
                        attempts: attempted.attempts,
                    },
                    Err(e) => Outcome::Failure {
                        reason: e.to_string(),
                        code: e.error_code().to_string(),
                        attempts: attempted.attempts,
                    },
                }
            }
        })
        .await
    }
}
