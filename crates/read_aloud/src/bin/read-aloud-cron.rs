use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use apalis::{
    layers::{retry::RetryPolicy, sentry::SentryLayer},
    prelude::*,
};
use apalis_cron::{CronStream, Tick};
use clap::Parser;
use cron::Schedule;
use read_aloud::{
    batch::{list_inputs, run_batch, BatchOptions},
    merger::{AudioFormat, CrossfadeSpec},
    source::document::DocumentFetcher,
    synth::speech::SpeechClient,
    tracing::init_tracing_subscriber,
    ReadAloudPipelineBuilder,
};

#[derive(Parser)]
#[command(name = "read-aloud-cron", about = "Periodically narrate new documents dropped in an inbox")]
struct Cli {
    /// Directory watched for new documents
    #[arg(long, env = "READ_ALOUD_INBOX", default_value = "./convert")]
    inbox: PathBuf,

    /// Only documents with this extension are picked up
    #[arg(long, env = "READ_ALOUD_EXTENSION", default_value = "pdf")]
    extension: String,

    #[arg(long, env = "READ_ALOUD_OUTPUT", default_value = "converted")]
    output_dir: PathBuf,

    #[arg(long, env = "SPEECH_BASE_URL", default_value = SpeechClient::DEFAULT_BASE_URL)]
    speech_url: String,

    #[arg(long, default_value = "wav")]
    format: AudioFormat,

    #[arg(long, default_value = "200")]
    crossfade_min_ms: u32,

    #[arg(long, default_value = "1000")]
    crossfade_max_ms: u32,

    /// Documents converted concurrently per tick
    #[arg(long, env = "MAX_CONCURRENT_RUNS", default_value = "2")]
    max_concurrent_runs: usize,

    /// Working directory for scratch segments
    #[arg(long, default_value = "/var/tmp/read-aloud")]
    workdir: PathBuf,

    /// Cron schedule expression
    #[arg(long, env = "CRON_SCHEDULE", default_value = "0 */15 * * * *")]
    schedule: String,
}

#[derive(Clone)]
struct Config {
    inbox: PathBuf,
    extension: String,
    output_dir: PathBuf,
    speech_url: String,
    format: AudioFormat,
    crossfade: CrossfadeSpec,
    max_concurrent_runs: usize,
    workdir: PathBuf,
}

/// Inbox documents without an artifact in the output directory yet
fn pending_inputs(config: &Config) -> anyhow::Result<Vec<String>> {
    let inputs = list_inputs(&config.inbox, &config.extension)
        .with_context(|| format!("Failed to list {}", config.inbox.display()))?
        .into_iter()
        .filter(|path| {
            path.file_stem().is_some_and(|stem| {
                let mut artifact = config.output_dir.join(stem);
                artifact.set_extension(config.format.extension());
                !artifact.exists()
            })
        })
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    Ok(inputs)
}

async fn convert_pending(config: &Config) -> anyhow::Result<()> {
    let inputs = pending_inputs(config)?;
    if inputs.is_empty() {
        tracing::info!("No new documents to convert at this time");
        return Ok(());
    }

    let pipeline = ReadAloudPipelineBuilder::new(&config.workdir)
        .backend(SpeechClient::new(&config.speech_url))
        .crossfade(config.crossfade)
        .format(config.format)
        .build();

    let options = BatchOptions {
        max_concurrent_runs: config.max_concurrent_runs,
        max_chars: None,
    };
    let report = run_batch(
        &pipeline,
        &DocumentFetcher::default(),
        &inputs,
        &config.output_dir,
        &options,
    )
    .await?;

    if report.failed() > 0 {
        tracing::warn!(failed = report.failed(), "Some documents failed to convert");
    }
    Ok(())
}

async fn handle_tick(_tick: Tick, config: Data<Config>) -> anyhow::Result<()> {
    tracing::info!(inbox = ?config.inbox, "Checking inbox for documents...");
    convert_pending(&config).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let _guard = sentry::init((
        std::env::var("SENTRY_DSN").unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some("production".into()),
            ..Default::default()
        },
    ));

    let cli = Cli::parse();
    init_tracing_subscriber()?;

    let config = Config {
        inbox: cli.inbox,
        extension: cli.extension,
        output_dir: cli.output_dir,
        speech_url: cli.speech_url,
        format: cli.format,
        crossfade: CrossfadeSpec::new(cli.crossfade_min_ms, cli.crossfade_max_ms)?,
        max_concurrent_runs: cli.max_concurrent_runs,
        workdir: cli.workdir,
    };

    tracing::info!(schedule = %cli.schedule, "Starting cron scheduler...");
    let schedule = Schedule::from_str(&cli.schedule)?;

    let worker = WorkerBuilder::new("read-aloud-cron")
        .backend(CronStream::new(schedule))
        .retry(RetryPolicy::retries(3))
        .layer(SentryLayer::new())
        .data(config)
        .build(handle_tick);

    worker.run().await?;

    Ok(())
}
