//! Core types for papercast: work items, per-item outcomes, run context and
//! run summary.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{RateLimitConfig, RetryConfig};

/// Identifier of a work item, unique within a run
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a work item's input lives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    /// Remote resource
    Url(String),
    /// Local file
    Path(PathBuf),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Url(url) => f.write_str(url),
            Locator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One unit of input, immutable once enumerated
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier within the run
    pub id: ItemId,
    /// Source locator (URL or file path)
    pub locator: Locator,
    /// Optional associated record (e.g., the listing entry it came from)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WorkItem {
    /// Create a work item without metadata
    pub fn new(id: impl Into<ItemId>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
            metadata: None,
        }
    }

    /// Attach metadata to the item
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Payload produced by a successful unit of work
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes (e.g., a downloaded PDF)
    Bytes(Vec<u8>),
    /// Generated text
    Text(String),
}

impl Payload {
    /// View the payload as bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Bytes(bytes) => bytes,
            Payload::Text(text) => text.as_bytes(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Terminal result of processing one work item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The item was processed
    Success {
        /// Produced payload
        payload: Payload,
        /// Number of attempts it took (>= 1)
        attempts: u32,
    },
    /// The item could not be processed
    Failure {
        /// Human-readable reason (the last error)
        reason: String,
        /// Machine-readable error code
        code: String,
        /// Number of attempts made (0 when never dispatched)
        attempts: u32,
    },
}

impl Outcome {
    /// Whether this is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Number of attempts recorded for this outcome
    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Success { attempts, .. } | Outcome::Failure { attempts, .. } => *attempts,
        }
    }

    /// Payload of a successful outcome
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Success { payload, .. } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }
}

/// A failed item as reported in the run summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Item identifier
    pub id: ItemId,
    /// Last error message
    pub reason: String,
    /// Machine-readable error code
    pub code: String,
    /// Attempts made
    pub attempts: u32,
}

/// Aggregate counts for one run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items enumerated and processed
    pub total: usize,
    /// Items with a success outcome
    pub succeeded: usize,
    /// Items with a failure outcome
    pub failed: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Failed items in enumeration order
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    /// Fold one outcome into the summary
    pub fn record(&mut self, id: &ItemId, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Success { .. } => self.succeeded += 1,
            Outcome::Failure {
                reason,
                code,
                attempts,
            } => {
                self.failed += 1;
                self.failures.push(FailedItem {
                    id: id.clone(),
                    reason: reason.clone(),
                    code: code.clone(),
                    attempts: *attempts,
                });
            }
        }
    }

    /// Whether success and failure counts add up to the total
    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed == self.total && self.failures.len() == self.failed
    }
}

/// Orchestrator state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run context created
    Init,
    /// Work items enumerated (at least one)
    SourceResolved,
    /// Every item has a terminal outcome
    Dispatched,
    /// Outcomes merged into the combined artifact and summary
    Aggregated,
    /// Artifacts written and summary logged
    Reported,
    /// Run finished
    Done,
    /// Enumeration produced no items
    AbortedEarly,
    /// Enumeration itself failed
    Failed,
}

impl RunState {
    /// Whether `next` is the single legal successor of this state
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, SourceResolved)
                | (Init, Failed)
                | (SourceResolved, Dispatched)
                | (SourceResolved, AbortedEarly)
                | (Dispatched, Aggregated)
                | (Aggregated, Reported)
                | (Reported, Done)
        )
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::AbortedEarly | RunState::Failed
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::SourceResolved => "source_resolved",
            RunState::Dispatched => "dispatched",
            RunState::Aggregated => "aggregated",
            RunState::Reported => "reported",
            RunState::Done => "done",
            RunState::AbortedEarly => "aborted_early",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Invariant parameters of one run, created once and shared read-only by all workers
#[derive(Clone, Debug)]
pub struct RunContext {
    /// Run start timestamp
    pub started_at: DateTime<Local>,
    /// Run date in `YYYYMMDD` form, used for directory and file names
    pub run_date: String,
    /// Root directory under which category directories are created
    pub output_root: PathBuf,
    /// Concurrency ceiling for the worker pool
    pub concurrency: usize,
    /// Retry policy for per-item operations
    pub retry: RetryConfig,
    /// Request pacing for throttled pipelines
    pub rate_limit: RateLimitConfig,
    /// Optional deadline after which no new items are dispatched
    pub deadline: Option<Duration>,
    /// Cancellation signal; once triggered no new items are dispatched
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Create a context for a run starting now
    pub fn new(output_root: impl Into<PathBuf>, concurrency: usize) -> Self {
        let started_at = Local::now();
        Self {
            run_date: crate::output::run_date_string(&started_at),
            started_at,
            output_root: output_root.into(),
            concurrency,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the run date (reprocessing a past day)
    pub fn with_run_date(mut self, run_date: impl Into<String>) -> Self {
        self.run_date = run_date.into();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the rate-limit policy
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the dispatch deadline
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Output directory for one category: `<root>/<category>/<run_date>`
    pub fn output_dir(&self, category: &str) -> PathBuf {
        self.output_root.join(category).join(&self.run_date)
    }

    /// Freeze the context for sharing with workers
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
