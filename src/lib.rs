//! # papercast
//!
//! Turns the day's research papers into a podcast episode: list and download
//! the papers, generate a spoken segment per paper, stitch the segments into
//! one script, and narrate it.
//!
//! ## Design
//!
//! Every batch step is the same shape. A [`source::WorkItemSource`] enumerates
//! items, a [`pool::BoundedWorkerPool`] runs one unit of work per item with a
//! concurrency ceiling, each unit is retried by a [`retry::RetryingClient`],
//! and a [`aggregate::ResultAggregator`] merges the outcomes in enumeration
//! order. A failing item never aborts the run; it is reported in the
//! [`types::RunSummary`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use papercast::{Config, RunOptions, runner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(std::path::Path::new("config.json"))?;
//!     let report = runner::download(&config, &RunOptions::default()).await?;
//!     println!("{} of {} papers downloaded", report.summary.succeeded, report.summary.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Combined artifact and run summary
pub mod aggregate;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Generative text API client
pub mod generate;
/// Shared HTTP session
pub mod http;
/// Log subscriber setup
pub mod logging;
/// Run state machine
pub mod orchestrator;
/// Output layout and atomic writes
pub mod output;
/// Per-item pipeline operations
pub mod pipelines;
/// Bounded worker pool
pub mod pool;
/// Per-call request pacing
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Command wiring
pub mod runner;
/// Work item sources
pub mod source;
/// Text-to-speech API client
pub mod speech;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{Error, Result, RetryClass};
pub use orchestrator::{RunOrchestrator, RunReport};
pub use runner::RunOptions;
pub use types::{ItemId, Outcome, Payload, RunContext, RunState, RunSummary, WorkItem};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// Spawns a background task. Cancelling stops the worker pool from starting
/// new items; items already running finish on their own.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use papercast::{RunOptions, cancel_on_shutdown};
///
/// #[tokio::main]
/// async fn main() {
///     let options = RunOptions::default();
///     let _signals = cancel_on_shutdown(options.cancel.clone());
/// }
/// ```
pub fn cancel_on_shutdown(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::warn!("Shutdown requested, no new items will be started");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
