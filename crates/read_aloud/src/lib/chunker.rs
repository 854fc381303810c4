//! # Chunker
//!
//! Splits normalized document text into ordered [`TextUnit`]s small enough to
//! be synthesized independently.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::error::PipelineError;

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence regex"));

static BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

/// One bounded piece of source text slated for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Windows of `chunk_size` characters; the last one may be shorter
    FixedChars { chunk_size: usize },
    /// Every `sentences_per_unit` sentences form one unit
    Sentences { sentences_per_unit: usize },
    /// One unit per blank-line separated paragraph
    Paragraphs,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::FixedChars { chunk_size: 1000 }
    }
}

impl ChunkPolicy {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match *self {
            ChunkPolicy::FixedChars { chunk_size: 0 } => {
                Err(PipelineError::config("chunk_size must be greater than zero"))
            }
            ChunkPolicy::Sentences {
                sentences_per_unit: 0,
            } => Err(PipelineError::config(
                "sentences_per_unit must be greater than zero",
            )),
            _ => Ok(()),
        }
    }
}

/// Collapses every whitespace run (newlines included) into a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Splits `text` into ordered, non-empty units according to `policy`.
///
/// Empty or whitespace-only text yields no units.
pub fn chunk(text: &str, policy: &ChunkPolicy) -> Result<Vec<TextUnit>, PipelineError> {
    policy.validate()?;

    let pieces = match *policy {
        ChunkPolicy::FixedChars { chunk_size } => fixed_windows(text, chunk_size),
        ChunkPolicy::Sentences { sentences_per_unit } => {
            sentence_groups(text, sentences_per_unit)
        }
        ChunkPolicy::Paragraphs => paragraphs(text),
    };

    let units = pieces
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(index, content)| TextUnit { index, content })
        .collect::<Vec<_>>();

    tracing::debug!(units = units.len(), ?policy, "Chunked text");
    Ok(units)
}

fn fixed_windows(text: &str, chunk_size: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let chars = normalized.chars().collect::<Vec<_>>();

    chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect::<String>().trim().to_string())
        .collect()
}

/// Splits normalized text after runs of sentence-ending punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END_RE.find_iter(&normalized) {
        sentences.push(normalized[start..m.end()].trim().to_string());
        start = m.end();
    }
    if start < normalized.len() {
        sentences.push(normalized[start..].trim().to_string());
    }

    sentences.retain(|s| !s.is_empty());
    sentences
}

fn sentence_groups(text: &str, sentences_per_unit: usize) -> Vec<String> {
    split_sentences(text)
        .chunks(sentences_per_unit)
        .map(|group| group.join(" "))
        .collect()
}

fn paragraphs(text: &str) -> Vec<String> {
    BLANK_LINE_RE
        .split(text)
        .map(normalize_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(units: &[TextUnit]) -> Vec<&str> {
        units.iter().map(|u| u.content.as_str()).collect()
    }

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    const DOCUMENT: &str = "Deep networks are large.\nPruning removes weights!\n\n\
        Does the lottery ticket hold?   We find that it does.\n\n\n\
        Appendix follows here.";

    #[test]
    fn test_sentence_groups_of_three() {
        let units = chunk(
            "A. B. C. D. E. F. G.",
            &ChunkPolicy::Sentences {
                sentences_per_unit: 3,
            },
        )
        .unwrap();

        assert_eq!(contents(&units), vec!["A. B. C.", "D. E. F.", "G."]);
        assert_eq!(
            units.iter().map(|u| u.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_sentence_split_keeps_trailing_fragment() {
        let sentences = split_sentences("One. Two?! Three without end");
        assert_eq!(sentences, vec!["One.", "Two?!", "Three without end"]);
    }

    #[test]
    fn test_fixed_windows_last_window_shorter() {
        let units = chunk("abcdefghij", &ChunkPolicy::FixedChars { chunk_size: 4 }).unwrap();
        assert_eq!(contents(&units), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_fixed_windows_do_not_split_code_points() {
        let units = chunk("héllo wörld", &ChunkPolicy::FixedChars { chunk_size: 3 }).unwrap();
        assert_eq!(contents(&units), vec!["hél", "lo", "wör", "ld"]);
    }

    #[test]
    fn test_paragraphs_drop_empty_and_collapse_newlines() {
        let units = chunk(DOCUMENT, &ChunkPolicy::Paragraphs).unwrap();
        assert_eq!(
            contents(&units),
            vec![
                "Deep networks are large. Pruning removes weights!",
                "Does the lottery ticket hold? We find that it does.",
                "Appendix follows here.",
            ]
        );
    }

    #[test]
    fn test_empty_text_yields_no_units() {
        for policy in [
            ChunkPolicy::default(),
            ChunkPolicy::Sentences {
                sentences_per_unit: 2,
            },
            ChunkPolicy::Paragraphs,
        ] {
            assert!(chunk("", &policy).unwrap().is_empty());
            assert!(chunk(" \n\n \t", &policy).unwrap().is_empty());
        }
    }

    #[test]
    fn test_zero_sized_policies_are_config_errors() {
        assert!(chunk("text", &ChunkPolicy::FixedChars { chunk_size: 0 })
            .unwrap_err()
            .is_config());
        assert!(chunk(
            "text",
            &ChunkPolicy::Sentences {
                sentences_per_unit: 0
            }
        )
        .unwrap_err()
        .is_config());
    }

    #[test]
    fn test_sentence_and_paragraph_chunking_preserve_word_sequence() {
        for policy in [
            ChunkPolicy::Sentences {
                sentences_per_unit: 1,
            },
            ChunkPolicy::Sentences {
                sentences_per_unit: 4,
            },
            ChunkPolicy::Paragraphs,
        ] {
            let units = chunk(DOCUMENT, &policy).unwrap();
            let rejoined = units.iter().map(|u| u.content.as_str()).join(" ");
            assert_eq!(words(&rejoined), words(DOCUMENT), "policy {policy:?}");
        }
    }

    #[test]
    fn test_fixed_windows_preserve_non_whitespace_characters() {
        for chunk_size in [1, 3, 7, 64, 5000] {
            let units = chunk(DOCUMENT, &ChunkPolicy::FixedChars { chunk_size }).unwrap();

            let produced = units
                .iter()
                .flat_map(|u| u.content.chars())
                .filter(|c| !c.is_whitespace())
                .collect::<String>();
            let expected = DOCUMENT
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>();

            assert_eq!(produced, expected, "chunk_size {chunk_size}");
            assert!(units
                .iter()
                .all(|u| !u.content.trim().is_empty() && u.content.chars().count() <= chunk_size));
        }
    }
}
