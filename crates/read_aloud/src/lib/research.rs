use std::path::PathBuf;

use reqwest::Url;

use crate::{
    batch::truncate_chars,
    error::PipelineError,
    llm::{LengthBounds, Summarizer},
    pipeline::{ReadAloudPipeline, RunReport, RunRequest},
    search::SearchProvider,
    source::DocumentSource,
    synth::{SpeechBackend, TextCleaner},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchReport {
    pub query: String,
    /// Results whose text made it into the summary
    pub sources: Vec<Url>,
    pub summary: String,
    pub run: RunReport,
}

/// Searches the web for a query, summarizes what it finds and reads the
/// summary aloud.
pub struct ResearchAssistant<P, D, S> {
    search: P,
    source: D,
    summarizer: S,
    max_chars_per_source: Option<usize>,
}

impl<P, D, S> ResearchAssistant<P, D, S>
where
    P: SearchProvider + Sync,
    D: DocumentSource + Sync,
    S: Summarizer + Sync,
{
    pub fn new(search: P, source: D, summarizer: S) -> Self {
        Self {
            search,
            source,
            summarizer,
            max_chars_per_source: None,
        }
    }

    /// Caps how much of each fetched page goes into the summary
    pub fn with_max_chars_per_source(mut self, max_chars: usize) -> Self {
        self.max_chars_per_source = Some(max_chars);
        self
    }

    /// Fetches every URL in turn. Failed or empty documents are skipped.
    async fn gather(&self, urls: Vec<Url>) -> (Vec<Url>, Vec<String>) {
        let mut sources = Vec::new();
        let mut texts = Vec::new();

        for url in urls {
            match self.source.fetch_text(url.as_str()).await {
                Ok(text) if !text.trim().is_empty() => {
                    texts.push(truncate_chars(text, self.max_chars_per_source));
                    sources.push(url);
                }
                Ok(_) => tracing::warn!(url = %url, "Source has no text, skipping"),
                Err(e) => tracing::warn!(url = %url, error = %e, "Failed to fetch source, skipping"),
            }
        }

        (sources, texts)
    }

    #[tracing::instrument(skip(self, pipeline, output))]
    pub async fn research<B, C>(
        &self,
        pipeline: &ReadAloudPipeline<B, C>,
        query: &str,
        max_results: usize,
        output: impl Into<PathBuf>,
    ) -> Result<ResearchReport, PipelineError>
    where
        B: SpeechBackend + Send + Sync + 'static,
        C: TextCleaner + Send + Sync + 'static,
    {
        let urls = self
            .search
            .search(query, max_results)
            .await
            .map_err(|e| PipelineError::collaborator(P::PROVIDER_NAME, e))?;
        tracing::info!(count = urls.len(), "Found search results");

        let (sources, texts) = self.gather(urls).await;
        if texts.is_empty() {
            return Err(PipelineError::NoContent);
        }

        let combined = texts.join("\n\n");
        let bounds = LengthBounds::for_text(combined.len());
        let summary = self
            .summarizer
            .summarize(&combined, bounds)
            .await
            .map_err(|e| PipelineError::collaborator(S::SUMMARIZER_NAME, e))?
            .summary;

        let script = format!("Research results for: {query}.\n\n{summary}");
        let run = pipeline.run(RunRequest::new(script, output)).await?;

        Ok(ResearchReport {
            query: query.to_string(),
            sources,
            summary,
            run,
        })
    }
}
