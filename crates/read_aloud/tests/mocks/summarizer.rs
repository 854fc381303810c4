use std::sync::{Arc, Mutex};

use read_aloud::{LengthBounds, Summarizer, SummaryResponse};

#[derive(Clone)]
pub struct MockSummarizer {
    pub summary: String,
    pub calls: Arc<Mutex<Vec<(String, LengthBounds)>>>,
    pub fail_with: Option<String>,
}

impl MockSummarizer {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            summary: String::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(msg.to_string()),
        }
    }
}

impl Summarizer for MockSummarizer {
    const SUMMARIZER_NAME: &'static str = "mock-llm";
    type Error = anyhow::Error;

    async fn summarize(
        &self,
        content: &str,
        bounds: LengthBounds,
    ) -> Result<SummaryResponse, Self::Error> {
        self.calls
            .lock()
            .unwrap()
            .push((content.to_string(), bounds));
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        Ok(SummaryResponse {
            summary: self.summary.clone(),
        })
    }
}
