//! Per-item operations for the batch pipelines
//!
//! A [`Pipeline`] describes what one run does with each item (a single
//! attempt, retried by the orchestrator), where the per-item and combined
//! artifacts go, and how fragments are framed.

use crate::aggregate::Framing;
use crate::error::Result;
use crate::types::{Payload, WorkItem};
use async_trait::async_trait;

mod audio;
mod download;
mod script;

pub use audio::{AUDIO_CATEGORY, NarrationJob, NarrationReport, audio_file_name};
pub use download::{PAPERS_CATEGORY, PdfDownloadPipeline};
pub use script::{SCRIPTS_CATEGORY, ScriptPipeline, script_file_name};

/// One batch pipeline
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Output category; artifacts land in `<root>/<category>/<run_date>/`
    fn category(&self) -> &str;

    /// File name of the per-item artifact
    fn item_file_name(&self, item: &WorkItem) -> String;

    /// File name of the combined artifact
    fn combined_file_name(&self, run_date: &str) -> String;

    /// Header and footer around the combined fragments
    fn framing(&self) -> Framing {
        Framing::default()
    }

    /// Render one successful item into the combined artifact
    fn combined_fragment(&self, item: &WorkItem, payload: &Payload) -> String;

    /// Process one item, making a single attempt
    async fn process(&self, item: &WorkItem) -> Result<Payload>;

    /// Whether each item is paced by the rate limiter before processing
    fn throttled(&self) -> bool {
        false
    }
}
