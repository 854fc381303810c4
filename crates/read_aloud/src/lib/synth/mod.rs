pub mod speech;

use std::{convert::Infallible, fmt::Display, future::Future};

use futures::{Stream, StreamExt};

use crate::{chunker::TextUnit, error::PipelineError};

/// Voice settings handed to the speech backend for every unit of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice: String,
    pub speed: f32,
    pub lang_code: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "af_heart".into(),
            speed: 1.0,
            lang_code: "a".into(),
        }
    }
}

/// One piece of synthesized speech together with the text it voices.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechFragment {
    pub graphemes: String,
    pub phonemes: Option<String>,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub trait SpeechBackend {
    const BACKEND_NAME: &'static str;

    type Error: Display;

    /// Lazily synthesizes `text`. The stream is finite and consumed once.
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> impl Stream<Item = Result<SpeechFragment, Self::Error>> + Send;
}

pub trait TextCleaner {
    const CLEANER_NAME: &'static str;

    type Error: Display;

    fn clean(&self, text: &str) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Cleaner used when no cleaning collaborator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCleaner;

impl TextCleaner for PassthroughCleaner {
    const CLEANER_NAME: &'static str = "passthrough";

    type Error = Infallible;

    async fn clean(&self, text: &str) -> Result<String, Self::Error> {
        Ok(text.to_string())
    }
}

/// An absent cleaner passes text through unchanged
impl<T: TextCleaner + Sync> TextCleaner for Option<T> {
    const CLEANER_NAME: &'static str = T::CLEANER_NAME;

    type Error = T::Error;

    async fn clean(&self, text: &str) -> Result<String, Self::Error> {
        match self {
            Some(cleaner) => cleaner.clean(text).await,
            None => Ok(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedUnit {
    pub index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Audio(SynthesizedUnit),
    /// The unit voiced a stop marker. Fragments voiced before the marker
    /// are kept in `partial`; nothing from later units is.
    Stop {
        index: usize,
        marker: String,
        partial: Option<SynthesizedUnit>,
    },
}

impl SynthesisOutcome {
    pub fn index(&self) -> usize {
        match self {
            SynthesisOutcome::Audio(unit) => unit.index,
            SynthesisOutcome::Stop { index, .. } => *index,
        }
    }
}

/// Turns a single [`TextUnit`] into audio.
///
/// Holds no per-unit state, so units may be synthesized in any order or
/// concurrently.
#[derive(Debug)]
pub struct UnitSynthesizer<B, C = PassthroughCleaner> {
    backend: B,
    cleaner: C,
    voice: VoiceConfig,
    stop_markers: Vec<String>,
}

impl<B, C> UnitSynthesizer<B, C>
where
    B: SpeechBackend + Send + Sync,
    C: TextCleaner + Send + Sync,
{
    pub fn new(backend: B, cleaner: C, voice: VoiceConfig, stop_markers: Vec<String>) -> Self {
        Self {
            backend,
            cleaner,
            voice,
            stop_markers,
        }
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    /// Cleaning is best effort: any failure falls back to the raw content
    async fn clean(&self, unit: &TextUnit) -> String {
        match self.cleaner.clean(&unit.content).await {
            Ok(cleaned) if !cleaned.trim().is_empty() => cleaned,
            Ok(_) => {
                tracing::warn!(
                    index = unit.index,
                    cleaner = C::CLEANER_NAME,
                    "Cleaner returned empty text, using original"
                );
                unit.content.clone()
            }
            Err(e) => {
                tracing::warn!(
                    index = unit.index,
                    cleaner = C::CLEANER_NAME,
                    error = %e,
                    "Failed to clean text, using original"
                );
                unit.content.clone()
            }
        }
    }

    fn stop_marker_in(&self, graphemes: &str) -> Option<&str> {
        self.stop_markers
            .iter()
            .find(|marker| !marker.is_empty() && graphemes.contains(marker.as_str()))
            .map(String::as_str)
    }

    #[tracing::instrument(skip_all, fields(index = unit.index, backend = B::BACKEND_NAME))]
    pub async fn synthesize(&self, unit: &TextUnit) -> Result<SynthesisOutcome, PipelineError> {
        let text = self.clean(unit).await;

        let fragments = self.backend.synthesize(&text, &self.voice);
        futures::pin_mut!(fragments);

        let mut samples = Vec::new();
        let mut sample_rate = None;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment
                .inspect_err(|e| tracing::error!(error = %e, "Speech backend failed"))
                .map_err(|e| PipelineError::collaborator(B::BACKEND_NAME, e))?;

            if let Some(marker) = self.stop_marker_in(&fragment.graphemes) {
                tracing::info!(
                    marker,
                    kept_samples = samples.len(),
                    "Stop marker reached, ending synthesis"
                );
                let partial = sample_rate
                    .filter(|_| !samples.is_empty())
                    .map(|sample_rate| SynthesizedUnit {
                        index: unit.index,
                        samples,
                        sample_rate,
                    });
                return Ok(SynthesisOutcome::Stop {
                    index: unit.index,
                    marker: marker.to_string(),
                    partial,
                });
            }

            match sample_rate {
                None => sample_rate = Some(fragment.sample_rate),
                Some(rate) if rate != fragment.sample_rate => {
                    return Err(PipelineError::collaborator(
                        B::BACKEND_NAME,
                        format!(
                            "fragment sample rate {} differs from {rate} within one unit",
                            fragment.sample_rate
                        ),
                    ));
                }
                Some(_) => {}
            }
            samples.extend(fragment.samples);
        }

        match sample_rate {
            Some(sample_rate) if !samples.is_empty() => {
                tracing::debug!(samples = samples.len(), sample_rate, "Synthesized unit");
                Ok(SynthesisOutcome::Audio(SynthesizedUnit {
                    index: unit.index,
                    samples,
                    sample_rate,
                }))
            }
            _ => Err(PipelineError::collaborator(
                B::BACKEND_NAME,
                format!("no audio produced for unit {}", unit.index),
            )),
        }
    }
}
