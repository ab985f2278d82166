//! Wiring of configuration into complete runs
//!
//! Each function builds the shared HTTP session, the source, the pipeline and
//! the orchestrator for one command. Credentials are checked before any
//! network call is made.

use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::generate::GeminiClient;
use crate::http::HttpClient;
use crate::orchestrator::{RunOrchestrator, RunReport};
use crate::output::is_valid_run_date;
use crate::pipelines::{
    NarrationJob, NarrationReport, PAPERS_CATEGORY, PdfDownloadPipeline, ScriptPipeline,
};
use crate::retry::{RetryPolicy, RetryingClient};
use crate::source::{LocalDirSource, RemoteListingSource};
use crate::speech::ElevenLabsClient;
use crate::types::RunContext;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-invocation options that are not part of the configuration document
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Process this date (`YYYYMMDD`) instead of today
    pub run_date: Option<String>,
    /// Cancelled on shutdown signals
    pub cancel: CancellationToken,
}

/// Results of the `all` command
#[derive(Clone, Debug)]
pub struct FullRunReport {
    /// PDF download run
    pub download: RunReport,
    /// Script generation run
    pub script: RunReport,
    /// Narration, if a script was available
    pub audio: Option<NarrationReport>,
}

fn context(config: &Config, concurrency: usize, options: &RunOptions) -> Result<RunContext> {
    let mut ctx = RunContext::new(&config.output_root, concurrency)
        .with_retry(config.retry.clone())
        .with_rate_limit(config.rate_limit.clone())
        .with_deadline(config.run_deadline)
        .with_cancellation(options.cancel.clone());

    if let Some(date) = &options.run_date {
        if !is_valid_run_date(date) {
            return Err(Error::config(
                format!("'{}' is not a valid YYYYMMDD date", date),
                "date",
            ));
        }
        ctx = ctx.with_run_date(date.clone());
    }
    Ok(ctx)
}

fn retry_client(config: &Config) -> RetryingClient {
    RetryingClient::new(RetryPolicy::from(&config.retry))
}

/// Download the day's listed papers
pub async fn download(config: &Config, options: &RunOptions) -> Result<RunReport> {
    let ctx = context(config, config.download_workers, options)?;
    let http = HttpClient::new(config.request_timeout)?;

    let source = RemoteListingSource::new(
        http.clone(),
        retry_client(config),
        &config.listing_url,
        &config.pdf_url_template,
    );
    let pipeline = Arc::new(PdfDownloadPipeline::new(http));

    RunOrchestrator::new(ctx).run(&source, pipeline).await
}

/// Generate one script segment per downloaded paper and the combined episode script
pub async fn script(
    config: &Config,
    credentials: &Credentials,
    options: &RunOptions,
) -> Result<RunReport> {
    let api_key = credentials.require_gemini()?;
    let ctx = context(config, config.max_workers, options)?;
    let http = HttpClient::new(config.request_timeout)?;

    let source = LocalDirSource::new(ctx.output_dir(PAPERS_CATEGORY), "pdf");
    let generator = GeminiClient::new(http, api_key, &config.model_name)
        .with_api_base(&config.gemini_api_base);
    let pipeline = Arc::new(ScriptPipeline::new(
        Arc::new(generator),
        &config.system_instruction,
        &config.prompt_template,
        &config.podcast_title,
    ));

    RunOrchestrator::new(ctx).run(&source, pipeline).await
}

/// Narrate the combined script for the run date
pub async fn audio(
    config: &Config,
    credentials: &Credentials,
    options: &RunOptions,
) -> Result<Option<NarrationReport>> {
    let api_key = credentials.require_eleven()?;
    let ctx = context(config, 1, options)?;
    let http = HttpClient::new(config.request_timeout)?;

    let synthesizer = ElevenLabsClient::new(http, api_key, config.speech.clone());
    NarrationJob::new(Arc::new(synthesizer), retry_client(config))
        .run(&ctx)
        .await
}

/// Download, script and narrate in sequence for one date
///
/// Both credentials are checked up front so a missing key fails the run
/// before anything is downloaded.
pub async fn all(
    config: &Config,
    credentials: &Credentials,
    options: &RunOptions,
) -> Result<FullRunReport> {
    credentials.require_gemini()?;
    credentials.require_eleven()?;

    // Pin the date so a run crossing midnight stays in one directory
    let mut options = options.clone();
    if options.run_date.is_none() {
        options.run_date = Some(context(config, 1, &options)?.run_date);
    }

    let download_report = download(config, &options).await?;
    let script_report = script(config, credentials, &options).await?;

    let narration = if options.cancel.is_cancelled() {
        tracing::warn!("Shutdown requested, skipping narration");
        None
    } else {
        audio(config, credentials, &options).await?
    };

    Ok(FullRunReport {
        download: download_report,
        script: script_report,
        audio: narration,
    })
}
