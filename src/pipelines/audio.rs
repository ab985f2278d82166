use super::script::{SCRIPTS_CATEGORY, script_file_name};
use crate::error::Result;
use crate::output::{ensure_dir, write_atomic};
use crate::retry::RetryingClient;
use crate::speech::SpeechSynthesizer;
use crate::types::RunContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Output category of rendered episodes
pub const AUDIO_CATEGORY: &str = "audios";

/// File name of the rendered episode for a run date
pub fn audio_file_name(run_date: &str) -> String {
    format!("podcast_audio_{run_date}.mp3")
}

/// Where a narration ended up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarrationReport {
    /// Script that was read
    pub script_path: PathBuf,
    /// Audio file written
    pub audio_path: PathBuf,
    /// Size of the audio in bytes
    pub bytes: usize,
    /// Attempts it took the speech API
    pub attempts: u32,
}

/// Renders the day's combined script to a single audio file
pub struct NarrationJob {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    retry: RetryingClient,
}

impl NarrationJob {
    /// Create the job
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, retry: RetryingClient) -> Self {
        Self { synthesizer, retry }
    }

    /// Narrate the script for `ctx.run_date`
    ///
    /// Returns `Ok(None)` when no script exists for that date. The audio is
    /// buffered completely and written atomically, so a failed stream never
    /// leaves a truncated file behind.
    pub async fn run(&self, ctx: &RunContext) -> Result<Option<NarrationReport>> {
        let script_path = ctx
            .output_dir(SCRIPTS_CATEGORY)
            .join(script_file_name(&ctx.run_date));

        let script = match tokio::fs::read_to_string(&script_path).await {
            Ok(script) => script,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    run_date = %ctx.run_date,
                    path = %script_path.display(),
                    "No podcast script found for date, nothing to narrate"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let started = Instant::now();
        let attempted = self
            .retry
            .execute("narration", || self.synthesizer.synthesize(&script))
            .await;
        let attempts = attempted.attempts;
        let audio = attempted.result?;

        let audio_dir = ctx.output_dir(AUDIO_CATEGORY);
        ensure_dir(&audio_dir).await?;
        let audio_path = audio_dir.join(audio_file_name(&ctx.run_date));
        write_atomic(&audio_path, &audio).await?;

        info!(
            path = %audio_path.display(),
            bytes = audio.len(),
            attempts,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Podcast audio written"
        );

        Ok(Some(NarrationReport {
            script_path,
            audio_path,
            bytes: audio.len(),
            attempts,
        }))
    }
}
