pub mod builder;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use futures::StreamExt;
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use segment_store::{AudioSegment, ScratchSegmentStore, SegmentStore};
use tokio_util::sync::CancellationToken;

use crate::{
    chunker::{chunk, ChunkPolicy, TextUnit},
    error::PipelineError,
    merger::{AudioFormat, CrossfadeSpec, MergedArtifact, Merger},
    synth::{
        PassthroughCleaner, SpeechBackend, SynthesisOutcome, TextCleaner, UnitSynthesizer,
        VoiceConfig,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Chunking,
    Synthesizing,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Chunking => "chunking",
            RunState::Synthesizing => "synthesizing",
            RunState::Merging => "merging",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_policy: ChunkPolicy,
    pub crossfade: CrossfadeSpec,
    pub voice: VoiceConfig,
    /// Case-sensitive markers that end synthesis when voiced
    pub stop_markers: Vec<String>,
    /// Units synthesized at the same time; 1 is strictly sequential
    pub concurrency: usize,
    pub format: AudioFormat,
    /// Parent of each run's scratch namespace, the system temp dir if unset
    pub scratch_root: Option<PathBuf>,
    /// Fixes the crossfade draws, mostly for reproducible tests
    pub crossfade_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_policy: ChunkPolicy::default(),
            crossfade: CrossfadeSpec::default(),
            voice: VoiceConfig::default(),
            stop_markers: vec!["References".into()],
            concurrency: 1,
            format: AudioFormat::Wav,
            scratch_root: None,
            crossfade_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.chunk_policy.validate()?;
        self.crossfade.validate()?;
        if self.concurrency == 0 {
            return Err(PipelineError::config("concurrency must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Raw document text, already extracted
    pub text: String,
    pub output: PathBuf,
}

impl RunRequest {
    pub fn new(text: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub artifact: MergedArtifact,
    pub units: usize,
    pub segments: usize,
    /// A stop marker cut synthesis short
    pub stopped_early: bool,
}

/// Result of synthesizing one unit during a run
enum UnitResult {
    Segment(AudioSegment),
    /// Carries the audio voiced before the marker, if any
    Stop(Option<AudioSegment>),
    Failed(PipelineError),
}

/// Reads text aloud: chunk, synthesize every unit, then merge the segments
/// into a single artifact.
///
/// Runs share nothing but configuration and collaborators, so one pipeline
/// may serve many concurrent runs.
#[derive(Debug)]
pub struct ReadAloudPipeline<B, C = PassthroughCleaner>
where
    B: SpeechBackend + Send + Sync + 'static,
    C: TextCleaner + Send + Sync + 'static,
{
    synthesizer: UnitSynthesizer<B, C>,
    merger: Merger,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<B, C> ReadAloudPipeline<B, C>
where
    B: SpeechBackend + Send + Sync + 'static,
    C: TextCleaner + Send + Sync + 'static,
{
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that aborts every in-progress run of this pipeline at the next
    /// unit boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn transition(state: &mut RunState, next: RunState) {
        tracing::info!(state = %next, from = %state, "Run state changed");
        *state = next;
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn create_store(&self, output: &Path) -> Result<ScratchSegmentStore, PipelineError> {
        let label = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("run");

        let store = match &self.config.scratch_root {
            Some(root) => ScratchSegmentStore::new_in(root, label)?,
            None => ScratchSegmentStore::new(label)?,
        };
        Ok(store)
    }

    /// Synthesizes `units` through a pool of `concurrency` workers and
    /// persists every produced segment in `store`.
    ///
    /// Returns the segments to merge in index order, ending with whatever
    /// the lowest stopping unit voiced before its marker, and whether such a
    /// unit was found.
    #[tracing::instrument(skip_all, fields(units = units.len(), concurrency = self.config.concurrency))]
    async fn synthesize_units(
        &self,
        units: &[TextUnit],
        store: &mut ScratchSegmentStore,
    ) -> Result<(Vec<AudioSegment>, bool), PipelineError> {
        // lowest index that stopped or failed; later units need not run
        let cutoff = AtomicUsize::new(usize::MAX);

        let mut results = futures::stream::iter(units)
            .map(|unit| {
                let cutoff = &cutoff;
                async move {
                    if unit.index > cutoff.load(Ordering::Acquire) {
                        return (unit.index, None);
                    }
                    if self.cancel.is_cancelled() {
                        return (unit.index, Some(Err(PipelineError::Cancelled)));
                    }
                    (unit.index, Some(self.synthesizer.synthesize(unit).await))
                }
            })
            .buffer_unordered(self.config.concurrency);

        let mut completed = Vec::with_capacity(units.len());

        while let Some((index, result)) = results.next().await {
            self.check_cancelled()?;

            let Some(result) = result else {
                tracing::debug!(index, "Skipping unit past stop point");
                continue;
            };

            let unit_result = match result {
                Ok(SynthesisOutcome::Audio(audio)) => {
                    let segment = store.put(audio.index, &audio.samples, audio.sample_rate)?;
                    UnitResult::Segment(segment)
                }
                Ok(SynthesisOutcome::Stop {
                    index,
                    marker,
                    partial,
                }) => {
                    tracing::info!(
                        index,
                        marker = %marker,
                        partial = partial.is_some(),
                        "Stop marker found"
                    );
                    cutoff.fetch_min(index, Ordering::AcqRel);
                    let segment = partial
                        .map(|audio| store.put(audio.index, &audio.samples, audio.sample_rate))
                        .transpose()?;
                    UnitResult::Stop(segment)
                }
                Err(e) => {
                    cutoff.fetch_min(index, Ordering::AcqRel);
                    UnitResult::Failed(e)
                }
            };
            completed.push((index, unit_result));
        }

        let mut segments = Vec::with_capacity(completed.len());
        for (_, result) in completed.into_iter().sorted_by_key(|(index, _)| *index) {
            match result {
                UnitResult::Segment(segment) => segments.push(segment),
                UnitResult::Stop(partial) => {
                    segments.extend(partial);
                    return Ok((segments, true));
                }
                UnitResult::Failed(e) => return Err(e),
            }
        }

        Ok((segments, false))
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        state: &mut RunState,
    ) -> Result<RunReport, PipelineError> {
        Self::transition(state, RunState::Chunking);
        self.check_cancelled()?;

        let units = chunk(&request.text, &self.config.chunk_policy)?;
        if units.is_empty() {
            return Err(PipelineError::NoContent);
        }
        tracing::info!(count = units.len(), "Chunked text into units");

        let mut store = self.create_store(&request.output)?;

        Self::transition(state, RunState::Synthesizing);
        let (segments, stopped_early) = match self.synthesize_units(&units, &mut store).await {
            Ok((segments, _)) if segments.is_empty() => Err(PipelineError::NoAudioProduced),
            other => other,
        }
        .inspect_err(|_| {
            if let Err(e) = store.delete_all() {
                tracing::warn!(error = ?e, path = ?store.path(), "Failed to delete segments");
            }
        })?;

        if let Err(e) = self.check_cancelled() {
            store.delete_all()?;
            return Err(e);
        }

        Self::transition(state, RunState::Merging);
        let mut rng = match self.config.crossfade_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // the merger empties the store whatever the outcome
        let artifact = self
            .merger
            .merge(&mut store, &segments, &request.output, &mut rng)?;

        Self::transition(state, RunState::Done);

        Ok(RunReport {
            artifact,
            units: units.len(),
            segments: segments.len(),
            stopped_early,
        })
    }

    #[tracing::instrument(skip_all, fields(output = ?request.output, chars = request.text.len()))]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, PipelineError> {
        self.config.validate()?;

        let mut state = RunState::Idle;
        let report = self
            .run_stages(&request, &mut state)
            .await
            .inspect_err(|e| {
                tracing::error!(state = %RunState::Failed, from = %state, error = %e, "Run failed")
            })?;

        tracing::info!(
            segments = report.segments,
            stopped_early = report.stopped_early,
            path = ?report.artifact.path,
            "Run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use futures::Stream;

    use super::*;
    use crate::{synth::SpeechFragment, ReadAloudPipelineBuilder};

    /// Voices every unit as a single fragment of 100 samples at 1 kHz
    struct ToneBackend;

    impl SpeechBackend for ToneBackend {
        const BACKEND_NAME: &'static str = "tone";
        type Error = String;

        fn synthesize(
            &self,
            text: &str,
            _voice: &VoiceConfig,
        ) -> impl Stream<Item = Result<SpeechFragment, Self::Error>> + Send {
            futures::stream::iter(vec![Ok(SpeechFragment {
                graphemes: text.to_string(),
                phonemes: None,
                samples: vec![0.2; 100],
                sample_rate: 1000,
            })])
        }
    }

    fn pipeline(scratch: &Path, config: PipelineConfig) -> ReadAloudPipeline<ToneBackend> {
        ReadAloudPipelineBuilder::new(scratch)
            .backend(ToneBackend)
            .config(config)
            .build()
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.concurrency = 0;
        assert!(config.validate().unwrap_err().is_config());

        config.concurrency = 1;
        config.crossfade = CrossfadeSpec {
            min_ms: 10,
            max_ms: 1,
        };
        assert!(config.validate().unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_sentence_units_merge_into_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            chunk_policy: ChunkPolicy::Sentences {
                sentences_per_unit: 3,
            },
            crossfade: CrossfadeSpec::fixed(20),
            ..PipelineConfig::default()
        };
        let output = dir.path().join("out.wav");

        let report = pipeline(&dir.path().join("scratch"), config)
            .run(RunRequest::new("A. B. C. D. E. F. G.", &output))
            .await
            .unwrap();

        assert_eq!(report.units, 3);
        assert_eq!(report.segments, 3);
        assert_eq!(report.artifact.crossfades_ms, vec![20, 20]);
        assert!(!report.stopped_early);
        // 3 x 100 samples minus two 20 sample overlaps
        assert_eq!(report.artifact.duration_secs, 0.26);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_whitespace_only_text_has_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");

        let err = pipeline(dir.path(), PipelineConfig::default())
            .run(RunRequest::new(" \n\t ", &output))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoContent));
        assert!(!output.exists());
    }

    #[test]
    fn test_run_state_names() {
        assert_eq!(RunState::Synthesizing.to_string(), "synthesizing");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }
}
