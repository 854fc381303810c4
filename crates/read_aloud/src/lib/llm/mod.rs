pub mod ollama;

use std::{fmt::Display, future::Future};

use serde::Deserialize;

/// Target summary length in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

impl LengthBounds {
    /// Scales the bounds to the input: at most half the input and never more
    /// than 150, at least a tenth of the input and never less than 30, with
    /// `min` capped by `max`.
    pub fn for_text(text_len: usize) -> Self {
        let max = (text_len / 2).min(150);
        let min = (text_len / 10).max(30).min(max);
        Self { min, max }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

pub trait Summarizer {
    /// Inputs longer than this many characters are summarized piecewise and
    /// the partial summaries joined.
    const CHUNK_THRESHOLD: usize = 1000;
    const SUMMARIZER_NAME: &'static str;

    type Error: Display;

    fn summarize(
        &self,
        content: &str,
        bounds: LengthBounds,
    ) -> impl Future<Output = Result<SummaryResponse, Self::Error>> + Send;

    /// Summarizes each text on its own, in order, with bounds scaled to that
    /// text. Stops at the first failure.
    fn summarize_many<'a>(
        &'a self,
        texts: &'a [String],
    ) -> impl Future<Output = Result<Vec<SummaryResponse>, Self::Error>> + Send + 'a
    where
        Self: Sync,
    {
        async move {
            let mut summaries = Vec::with_capacity(texts.len());
            for text in texts {
                let bounds = LengthBounds::for_text(text.len());
                summaries.push(self.summarize(text, bounds).await?);
            }
            Ok(summaries)
        }
    }
}

/// Answers questions about a piece of text.
pub trait Reasoner {
    const REASONER_NAME: &'static str;

    type Error: Display;

    fn answer(
        &self,
        context: &str,
        question: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}
