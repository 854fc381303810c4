use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{Stream, StreamExt};
use read_aloud::synth::{SpeechBackend, SpeechFragment, VoiceConfig};
use tokio_util::sync::CancellationToken;

/// Voices each unit as one fragment whose graphemes are the unit text.
///
/// Behaviour can be tuned per unit with rules keyed by a substring of the
/// unit text.
#[derive(Clone)]
pub struct MockSpeechBackend {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_with: Option<String>,
    pub sample_rate: u32,
    pub samples_per_unit: usize,
    failures: Vec<(String, String)>,
    delays_ms: Vec<(String, u64)>,
    levels: Vec<(String, f32)>,
    sample_rates: Vec<(String, u32)>,
    cancel_after: Option<(usize, CancellationToken)>,
    fragment_per_sentence: bool,
}

impl Default for MockSpeechBackend {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
            sample_rate: 1000,
            samples_per_unit: 100,
            failures: Vec::new(),
            delays_ms: Vec::new(),
            levels: Vec::new(),
            sample_rates: Vec::new(),
            cancel_after: None,
            fragment_per_sentence: false,
        }
    }
}

fn rule_for<T: Clone>(rules: &[(String, T)], text: &str) -> Option<T> {
    rules
        .iter()
        .find(|(marker, _)| text.contains(marker.as_str()))
        .map(|(_, value)| value.clone())
}

impl MockSpeechBackend {
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, marker: &str, msg: &str) -> Self {
        self.failures.push((marker.to_string(), msg.to_string()));
        self
    }

    pub fn with_delay(mut self, marker: &str, ms: u64) -> Self {
        self.delays_ms.push((marker.to_string(), ms));
        self
    }

    /// Constant sample value for matching units, 0.1 otherwise
    pub fn with_level(mut self, marker: &str, level: f32) -> Self {
        self.levels.push((marker.to_string(), level));
        self
    }

    pub fn with_sample_rate(mut self, marker: &str, sample_rate: u32) -> Self {
        self.sample_rates.push((marker.to_string(), sample_rate));
        self
    }

    /// Voices every sentence of a unit as its own fragment
    pub fn fragment_per_sentence(mut self) -> Self {
        self.fragment_per_sentence = true;
        self
    }

    /// Cancels `token` as soon as the `calls`-th unit starts
    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }
}

impl SpeechBackend for MockSpeechBackend {
    const BACKEND_NAME: &'static str = "mock-speech";
    type Error = anyhow::Error;

    fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceConfig,
    ) -> impl Stream<Item = Result<SpeechFragment, Self::Error>> + Send {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(text.to_string());
            calls.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if call >= *after {
                token.cancel();
            }
        }

        let failure = self
            .fail_with
            .clone()
            .or_else(|| rule_for(&self.failures, text));
        let delay = rule_for(&self.delays_ms, text).unwrap_or(0);
        let pieces = if self.fragment_per_sentence {
            text.split_inclusive(". ")
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        } else {
            vec![text.to_string()]
        };
        let fragments = pieces
            .into_iter()
            .map(|graphemes| SpeechFragment {
                samples: vec![
                    rule_for(&self.levels, &graphemes).unwrap_or(0.1);
                    self.samples_per_unit
                ],
                sample_rate: rule_for(&self.sample_rates, &graphemes)
                    .unwrap_or(self.sample_rate),
                graphemes,
                phonemes: None,
            })
            .collect::<Vec<_>>();

        let first = futures::stream::once(async move {
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            failure
        })
        .filter_map(|failure| async move {
            failure.map(|msg| Err::<SpeechFragment, _>(anyhow::anyhow!("{}", msg)))
        });

        first.chain(futures::stream::iter(fragments.into_iter().map(Ok)))
    }
}
