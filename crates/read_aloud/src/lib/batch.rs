//! # Batch driver
//!
//! Reads many documents aloud, one independent run per document. A failing
//! document is recorded and the batch moves on.

use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use futures::StreamExt;
use itertools::Itertools;

use crate::{
    pipeline::{ReadAloudPipeline, RunRequest},
    source::{is_remote, DocumentSource},
    synth::{SpeechBackend, TextCleaner},
};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Documents read aloud at the same time
    pub max_concurrent_runs: usize,
    /// Only the first `max_chars` characters of each document are read
    pub max_chars: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 1,
            max_chars: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchItemOutcome {
    Converted(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub input: String,
    pub outcome: BatchItemOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One entry per input, in input order
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, BatchItemOutcome::Converted(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.converted()
    }
}

/// Files in `dir` with the given extension (case-insensitive), sorted by name.
pub fn list_inputs(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// File stem of a local path or the last segment of a URL path
fn stem_of(input: &str) -> Option<String> {
    let path = if is_remote(input) {
        let url = reqwest::Url::parse(input).ok()?;
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .last()?
            .to_string()
    } else {
        input.to_string()
    };

    Path::new(&path)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Assigns every input a distinct `<stem>.<ext>` inside `output_dir`
fn plan_outputs(inputs: &[String], output_dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut taken = HashSet::new();

    inputs
        .iter()
        .enumerate()
        .map(|(position, input)| {
            let stem = stem_of(input).unwrap_or_else(|| format!("document-{position}"));
            let mut name = format!("{stem}.{extension}");
            let mut suffix = 1;
            while !taken.insert(name.clone()) {
                name = format!("{stem}-{suffix}.{extension}");
                suffix += 1;
            }
            output_dir.join(name)
        })
        .collect()
}

/// Keeps the first `max_chars` characters of `text`, all of it if unset
pub fn truncate_chars(text: String, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text,
    }
}

/// Reads every input aloud into `output_dir`, with at most
/// `max_concurrent_runs` runs in flight. The artifact format is the one
/// configured on `pipeline`.
#[tracing::instrument(skip_all, fields(inputs = inputs.len(), output_dir = ?output_dir))]
pub async fn run_batch<B, C, D>(
    pipeline: &ReadAloudPipeline<B, C>,
    source: &D,
    inputs: &[String],
    output_dir: &Path,
    options: &BatchOptions,
) -> io::Result<BatchReport>
where
    B: SpeechBackend + Send + Sync + 'static,
    C: TextCleaner + Send + Sync + 'static,
    D: DocumentSource + Sync,
{
    std::fs::create_dir_all(output_dir)?;

    let extension = pipeline.config().format.extension();
    let outputs = plan_outputs(inputs, output_dir, extension);

    let items = futures::stream::iter(inputs.iter().zip_eq(outputs))
        .map(|(input, output)| async move {
            let outcome = match source.fetch_text(input).await {
                Err(e) => {
                    tracing::error!(input = %input, error = %e, "Failed to fetch document");
                    BatchItemOutcome::Failed(format!("fetch failed: {e}"))
                }
                Ok(text) => {
                    let text = truncate_chars(text, options.max_chars);
                    match pipeline.run(RunRequest::new(text, output)).await {
                        Ok(report) => {
                            tracing::info!(input = %input, path = ?report.artifact.path, "Converted document");
                            BatchItemOutcome::Converted(report.artifact.path)
                        }
                        Err(e) => {
                            tracing::error!(input = %input, error = %e, "Failed to convert document");
                            BatchItemOutcome::Failed(e.to_string())
                        }
                    }
                }
            };
            BatchItem {
                input: input.clone(),
                outcome,
            }
        })
        .buffered(options.max_concurrent_runs.max(1))
        .collect::<Vec<_>>()
        .await;

    let report = BatchReport { items };
    tracing::info!(
        converted = report.converted(),
        failed = report.failed(),
        "Batch finished"
    );
    Ok(report)
}
