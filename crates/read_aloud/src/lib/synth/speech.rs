use futures::{Stream, StreamExt};
use reqwest::Client;
use segment_store::{wav, AudioBuffer, StoreError};
use serde::Serialize;

use crate::{
    chunker::split_sentences,
    synth::{SpeechBackend, SpeechFragment, VoiceConfig},
};

/// Client for an OpenAI-compatible `/audio/speech` endpoint, such as a local
/// Kokoro server.
///
/// Each sentence of a unit is requested separately and surfaced as one
/// fragment, so a unit's stream is driven lazily sentence by sentence.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] StoreError),
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    lang_code: &'a str,
    response_format: &'static str,
}

impl SpeechClient {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8880/v1";
    pub const DEFAULT_MODEL: &str = "kokoro";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: Self::DEFAULT_MODEL.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub async fn send_speech_request(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioBuffer, SpeechError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &voice.voice,
            speed: voice.speed,
            lang_code: &voice.lang_code,
            response_format: "wav",
        };

        let mut request = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let resp = request
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Api { status, message });
        }

        let bytes = resp.bytes().await?;
        Ok(wav::decode_mono_bytes(&bytes)?)
    }
}

impl Default for SpeechClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

impl SpeechBackend for SpeechClient {
    const BACKEND_NAME: &'static str = "speech backend";

    type Error = SpeechError;

    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> impl Stream<Item = Result<SpeechFragment, Self::Error>> + Send {
        let voice = voice.clone();

        futures::stream::iter(split_sentences(text)).then(move |sentence| {
            let voice = voice.clone();
            async move {
                let audio = self.send_speech_request(&sentence, &voice).await?;
                Ok(SpeechFragment {
                    graphemes: sentence,
                    phonemes: None,
                    samples: audio.samples,
                    sample_rate: audio.sample_rate,
                })
            }
        })
    }
}
