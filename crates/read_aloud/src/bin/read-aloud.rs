use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use read_aloud::{
    batch::{list_inputs, run_batch, truncate_chars, BatchItemOutcome, BatchOptions},
    chunker::ChunkPolicy,
    merger::{AudioFormat, CrossfadeSpec},
    ollama::OllamaClient,
    research::ResearchAssistant,
    search::searx::SearxClient,
    source::{document::DocumentFetcher, DocumentSource},
    synth::{speech::SpeechClient, VoiceConfig},
    tracing::init_tracing_subscriber,
    PipelineConfig, ReadAloudPipeline, ReadAloudPipelineBuilder, Reasoner, RunRequest, Summarizer,
};

#[derive(Parser)]
#[command(name = "read-aloud", about = "Turn documents and web pages into narrated audio")]
struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct PipelineArgs {
    /// OpenAI-compatible speech endpoint
    #[arg(long, env = "SPEECH_BASE_URL", default_value = SpeechClient::DEFAULT_BASE_URL)]
    speech_url: String,

    /// API key for the speech endpoint, if it needs one
    #[arg(long, env = "SPEECH_API_KEY")]
    speech_api_key: Option<String>,

    #[arg(long, env = "SPEECH_MODEL", default_value = SpeechClient::DEFAULT_MODEL)]
    speech_model: String,

    #[arg(long, env = "VOICE", default_value = "af_heart")]
    voice: String,

    #[arg(long, default_value = "1.0")]
    speed: f32,

    #[arg(long, default_value = "a")]
    lang_code: String,

    /// Characters per unit; ignored when --sentences or --paragraphs is set
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Group this many sentences per unit
    #[arg(long, conflicts_with = "paragraphs")]
    sentences: Option<usize>,

    /// One unit per paragraph
    #[arg(long)]
    paragraphs: bool,

    #[arg(long, default_value = "200")]
    crossfade_min_ms: u32,

    #[arg(long, default_value = "1000")]
    crossfade_max_ms: u32,

    /// Synthesis stops at the first unit voicing one of these
    #[arg(long = "stop-marker", default_value = "References")]
    stop_markers: Vec<String>,

    /// Units synthesized concurrently
    #[arg(long, env = "SYNTH_CONCURRENCY", default_value = "1")]
    concurrency: usize,

    /// Output format, wav or mp3
    #[arg(long, default_value = "wav")]
    format: AudioFormat,

    /// Where per-run scratch segments live
    #[arg(long, env = "READ_ALOUD_SCRATCH", default_value = "/var/tmp/read-aloud")]
    scratch_dir: PathBuf,

    /// Clean each unit with the LLM before synthesis
    #[arg(long)]
    clean: bool,

    /// Drop the first line of cleaned text (for models that add a preamble)
    #[arg(long, requires = "clean")]
    strip_preamble: bool,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = OllamaClient::DEFAULT_BASE_URL)]
    ollama_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = OllamaClient::DEFAULT_MODEL)]
    ollama_model: String,

    /// Only read the first N characters of each document
    #[arg(long)]
    max_chars: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Read one document or URL aloud
    Run {
        input: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Read every matching document in a directory aloud
    Batch {
        #[arg(long, default_value = "./convert")]
        input_dir: PathBuf,
        #[arg(long, default_value = "pdf")]
        extension: String,
        #[arg(long, default_value = "converted")]
        output_dir: PathBuf,
        #[arg(long, env = "MAX_CONCURRENT_RUNS", default_value = "1")]
        max_concurrent_runs: usize,
    },
    /// Summarize each document on its own and print the summaries
    Summarize {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Answer a question about a document, optionally reading the answer aloud
    Ask {
        input: String,
        question: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search the web, summarize the results and read the summary aloud
    Research {
        query: String,
        #[arg(long, default_value = "5")]
        max_results: usize,
        #[arg(long, env = "SEARX_BASE_URL", default_value = "http://localhost:8080")]
        searx_url: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

impl PipelineArgs {
    fn chunk_policy(&self) -> ChunkPolicy {
        match (self.sentences, self.paragraphs) {
            (_, true) => ChunkPolicy::Paragraphs,
            (Some(sentences_per_unit), false) => ChunkPolicy::Sentences { sentences_per_unit },
            (None, false) => ChunkPolicy::FixedChars {
                chunk_size: self.chunk_size,
            },
        }
    }

    fn ollama(&self) -> OllamaClient {
        OllamaClient::new(&self.ollama_url, &self.ollama_model)
            .with_preamble_stripping(self.strip_preamble)
    }

    fn build_pipeline(
        &self,
    ) -> anyhow::Result<ReadAloudPipeline<SpeechClient, Option<OllamaClient>>> {
        let crossfade = CrossfadeSpec::new(self.crossfade_min_ms, self.crossfade_max_ms)?;

        let mut speech = SpeechClient::new(&self.speech_url).with_model(&self.speech_model);
        if let Some(key) = &self.speech_api_key {
            speech = speech.with_api_key(key);
        }

        let config = PipelineConfig {
            chunk_policy: self.chunk_policy(),
            crossfade,
            voice: VoiceConfig {
                voice: self.voice.clone(),
                speed: self.speed,
                lang_code: self.lang_code.clone(),
            },
            stop_markers: self.stop_markers.clone(),
            concurrency: self.concurrency,
            format: self.format,
            ..PipelineConfig::default()
        };
        config.validate()?;

        let pipeline = ReadAloudPipelineBuilder::new(&self.scratch_dir)
            .backend(speech)
            .cleaner(self.clean.then(|| self.ollama()))
            .config(config)
            .build();

        Ok(pipeline)
    }
}

async fn fetch(
    source: &DocumentFetcher,
    input: &str,
    max_chars: Option<usize>,
) -> anyhow::Result<String> {
    let text = source
        .fetch_text(input)
        .await
        .with_context(|| format!("Failed to read {input}"))?;

    Ok(truncate_chars(text, max_chars))
}

#[tokio::main]
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

    let source = DocumentFetcher::default();
    let args = cli.pipeline;

    match cli.command {
        Command::Run { input, output } => {
            let pipeline = args.build_pipeline()?;
            let token = pipeline.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling run");
                    token.cancel();
                }
            });

            let text = fetch(&source, &input, args.max_chars).await?;
            let report = pipeline
                .run(RunRequest::new(text, output))
                .await
                .context("Failed to read document aloud")?;

            println!("{}", report.artifact.path.display());
        }
        Command::Batch {
            input_dir,
            extension,
            output_dir,
            max_concurrent_runs,
        } => {
            let pipeline = args.build_pipeline()?;
            let inputs = list_inputs(&input_dir, &extension)
                .with_context(|| format!("Failed to list {}", input_dir.display()))?
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            tracing::info!(count = inputs.len(), "Converting documents");

            let options = BatchOptions {
                max_concurrent_runs,
                max_chars: args.max_chars,
            };
            let report = run_batch(&pipeline, &source, &inputs, &output_dir, &options).await?;

            for item in &report.items {
                match &item.outcome {
                    BatchItemOutcome::Converted(path) => {
                        println!("ok    {} -> {}", item.input, path.display())
                    }
                    BatchItemOutcome::Failed(reason) => {
                        println!("fail  {}: {reason}", item.input)
                    }
                }
            }
        }
        Command::Summarize { inputs } => {
            let mut texts = Vec::with_capacity(inputs.len());
            for input in &inputs {
                texts.push(fetch(&source, input, args.max_chars).await?);
            }
            let summaries = args
                .ollama()
                .summarize_many(&texts)
                .await
                .context("Failed to summarize documents")?;

            for (input, summary) in inputs.iter().zip(summaries) {
                println!("# {input}\n{}\n", summary.summary);
            }
        }
        Command::Ask {
            input,
            question,
            output,
        } => {
            let text = fetch(&source, &input, args.max_chars).await?;
            let answer = args
                .ollama()
                .answer(&text, &question)
                .await
                .context("Failed to answer question")?;
            println!("{answer}");

            if let Some(output) = output {
                let report = args
                    .build_pipeline()?
                    .run(RunRequest::new(answer, output))
                    .await
                    .context("Failed to read answer aloud")?;
                println!("{}", report.artifact.path.display());
            }
        }
        Command::Research {
            query,
            max_results,
            searx_url,
            output,
        } => {
            let pipeline = args.build_pipeline()?;
            let assistant =
                ResearchAssistant::new(SearxClient::new(searx_url), source, args.ollama());
            let report = assistant
                .research(&pipeline, &query, max_results, output)
                .await
                .context("Research failed")?;

            for url in &report.sources {
                println!("source  {url}");
            }
            println!("{}", report.summary);
            println!("{}", report.run.artifact.path.display());
        }
    }

    Ok(())
}
