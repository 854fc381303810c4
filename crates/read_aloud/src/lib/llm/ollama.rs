use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    chunker::{chunk, ChunkPolicy},
    llm::{LengthBounds, Reasoner, Summarizer, SummaryResponse},
    synth::TextCleaner,
};

/// Client for a local Ollama server, used both to clean text before speech
/// synthesis and to summarize documents.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    strip_preamble: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Model returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

impl OllamaClient {
    const CLEAN_PROMPT: &str = include_str!("./prompts/clean_text.txt");
    const SUMMARIZE_PROMPT: &str = include_str!("./prompts/summarize.txt");
    const ANSWER_PROMPT: &str = include_str!("./prompts/answer.txt");

    pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
    pub const DEFAULT_MODEL: &str = "llama3.2";

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            strip_preamble: false,
        }
    }

    /// Drops the first line of every cleaned response.
    ///
    /// Only meant for models that reliably open with a line such as
    /// "Here is the cleaned text:". Off by default since it discards real
    /// content for models that do not.
    pub fn with_preamble_stripping(mut self, strip: bool) -> Self {
        self.strip_preamble = strip;
        self
    }

    pub async fn send_generate_request(
        &self,
        prompt: String,
    ) -> Result<GenerateResponse, OllamaError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OllamaError::Api { status, message });
        }

        Ok(resp.json::<GenerateResponse>().await?)
    }

    async fn summarize_piece(
        &self,
        content: &str,
        bounds: LengthBounds,
    ) -> Result<String, OllamaError> {
        let prompt = format!(
            "{}\nUse between {} and {} words.\n\n{content}",
            Self::SUMMARIZE_PROMPT.trim_end(),
            bounds.min,
            bounds.max
        );

        let response = self
            .send_generate_request(prompt)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to summarize content"))?;

        let summary = response.response.trim();
        if summary.is_empty() {
            return Err(OllamaError::EmptyResponse);
        }
        Ok(summary.to_string())
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL, Self::DEFAULT_MODEL)
    }
}

fn strip_first_line(text: &str) -> &str {
    text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
}

impl TextCleaner for OllamaClient {
    const CLEANER_NAME: &'static str = "ollama cleaner";

    type Error = OllamaError;

    #[tracing::instrument(skip_all, fields(model = %self.model, len = text.len()))]
    async fn clean(&self, text: &str) -> Result<String, Self::Error> {
        let prompt = format!("{}\n{text}", Self::CLEAN_PROMPT.trim_end());
        let response = self.send_generate_request(prompt).await?;

        let mut cleaned = response.response.trim();
        if self.strip_preamble {
            cleaned = strip_first_line(cleaned).trim();
        }
        if cleaned.is_empty() {
            return Err(OllamaError::EmptyResponse);
        }

        tracing::debug!(cleaned_len = cleaned.len(), "Cleaned text");
        Ok(cleaned.to_string())
    }
}

impl Summarizer for OllamaClient {
    const SUMMARIZER_NAME: &'static str = "ollama summarizer";

    type Error = OllamaError;

    #[tracing::instrument(skip_all, fields(model = %self.model, len = content.len()))]
    async fn summarize(
        &self,
        content: &str,
        bounds: LengthBounds,
    ) -> Result<SummaryResponse, Self::Error> {
        if content.chars().count() <= Self::CHUNK_THRESHOLD {
            let summary = self.summarize_piece(content, bounds).await?;
            return Ok(SummaryResponse { summary });
        }

        let pieces = chunk(
            content,
            &ChunkPolicy::FixedChars {
                chunk_size: Self::CHUNK_THRESHOLD,
            },
        )
        .unwrap_or_default();
        tracing::info!(pieces = pieces.len(), "Summarizing long input piecewise");

        // every piece gets the bounds computed for the whole input
        let mut summaries = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            summaries.push(self.summarize_piece(&piece.content, bounds).await?);
        }

        Ok(SummaryResponse {
            summary: summaries.join(" "),
        })
    }
}

impl Reasoner for OllamaClient {
    const REASONER_NAME: &'static str = "ollama reasoner";

    type Error = OllamaError;

    #[tracing::instrument(skip_all, fields(model = %self.model, context_len = context.len()))]
    async fn answer(&self, context: &str, question: &str) -> Result<String, Self::Error> {
        let prompt = format!(
            "{}\n\nContext:\n{context}\n\nQuestion: {question}",
            Self::ANSWER_PROMPT.trim_end()
        );

        let response = self
            .send_generate_request(prompt)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to answer question"))?;

        let answer = response.response.trim();
        if answer.is_empty() {
            return Err(OllamaError::EmptyResponse);
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHttpServer;

    const GENERATED: &str = r#"{"model":"llama3.2","response":" piece summary ","done":true}"#;

    fn prompts(server: &FakeHttpServer) -> Vec<String> {
        server
            .requests()
            .iter()
            .map(|body| {
                let value: serde_json::Value = serde_json::from_str(body).unwrap();
                value["prompt"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_strip_first_line() {
        assert_eq!(
            strip_first_line("Here is the cleaned text:\nActual line.\nMore."),
            "Actual line.\nMore."
        );
        assert_eq!(strip_first_line("single line"), "");
    }

    #[test]
    fn test_generate_response_deserializes_without_done() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3.2","response":"ok"}"#).unwrap();
        assert_eq!(resp.response, "ok");
        assert!(!resp.done);
    }

    #[tokio::test]
    async fn test_long_input_pieces_share_caller_bounds() {
        let server = FakeHttpServer::start("application/json", GENERATED).await;
        let client = OllamaClient::new(&server.base_url, "llama3.2");
        let content = "The network was pruned and retrained. ".repeat(70);
        let bounds = LengthBounds { min: 42, max: 77 };

        let response = client.summarize(&content, bounds).await.unwrap();

        let prompts = prompts(&server);
        assert!(prompts.len() >= 2);
        for prompt in &prompts {
            assert!(prompt.contains("Use between 42 and 77 words."), "{prompt}");
        }
        assert_eq!(
            response.summary,
            vec!["piece summary"; prompts.len()].join(" ")
        );
    }

    #[tokio::test]
    async fn test_short_input_is_summarized_once() {
        let server = FakeHttpServer::start("application/json", GENERATED).await;
        let client = OllamaClient::new(&server.base_url, "llama3.2");

        let response = client
            .summarize("Short text.", LengthBounds { min: 5, max: 10 })
            .await
            .unwrap();

        assert_eq!(response.summary, "piece summary");
        let prompts = prompts(&server);
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Use between 5 and 10 words."));
        assert!(prompts[0].ends_with("Short text."));
    }

    #[tokio::test]
    async fn test_answer_sends_context_and_question() {
        let server = FakeHttpServer::start(
            "application/json",
            r#"{"model":"llama3.2","response":"About ninety percent.\n","done":true}"#,
        )
        .await;
        let client = OllamaClient::new(&server.base_url, "llama3.2");

        let answer = client
            .answer("Pruning removed 90% of the weights.", "How much was pruned?")
            .await
            .unwrap();

        assert_eq!(answer, "About ninety percent.");
        let prompts = prompts(&server);
        assert!(prompts[0].contains("Context:\nPruning removed 90% of the weights."));
        assert!(prompts[0].ends_with("Question: How much was pruned?"));
    }
}
