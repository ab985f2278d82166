use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use papercast::{Config, Credentials, RunOptions, RunReport, RunState, logging, runner};

#[derive(Parser)]
#[command(
    name = "papercast",
    version,
    about = "Turn the day's research papers into a podcast episode"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration document
    #[arg(long, env = "PAPERCAST_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    /// Process this date (YYYYMMDD) instead of today
    #[arg(long, global = true)]
    date: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the day's listed papers
    Download,
    /// Generate the podcast script from downloaded papers
    Script,
    /// Narrate the podcast script
    Audio,
    /// Download, script and narrate in sequence
    All,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, path = %cli.config.display(), "Could not load configuration");
            return ExitCode::FAILURE;
        }
    };
    let credentials = Credentials::from_env();

    let options = RunOptions {
        run_date: cli.date,
        ..RunOptions::default()
    };
    let signals = papercast::cancel_on_shutdown(options.cancel.clone());

    let result = match cli.command {
        Commands::Download => runner::download(&config, &options)
            .await
            .map(|r| log_report("download", &r)),
        Commands::Script => runner::script(&config, &credentials, &options)
            .await
            .map(|r| log_report("script", &r)),
        Commands::Audio => runner::audio(&config, &credentials, &options).await.map(|r| {
            if r.is_none() {
                tracing::warn!("No audio produced");
            }
        }),
        Commands::All => runner::all(&config, &credentials, &options).await.map(|r| {
            log_report("download", &r.download);
            log_report("script", &r.script);
        }),
    };

    signals.abort();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "Run failed");
            ExitCode::FAILURE
        }
    }
}

fn log_report(step: &str, report: &RunReport) {
    match report.state {
        RunState::AbortedEarly => {
            tracing::warn!(step, run_date = %report.run_date, "Nothing to process");
        }
        _ => {
            tracing::info!(
                step,
                total = report.summary.total,
                succeeded = report.summary.succeeded,
                failed = report.summary.failed,
                "Step finished"
            );
        }
    }
}
