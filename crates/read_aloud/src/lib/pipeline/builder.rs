use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::{
    chunker::ChunkPolicy,
    merger::{AudioFormat, CrossfadeSpec, Merger},
    synth::{PassthroughCleaner, SpeechBackend, TextCleaner, UnitSynthesizer, VoiceConfig},
    PipelineConfig, ReadAloudPipeline,
};

pub struct ReadAloudPipelineBuilder<B = (), C = PassthroughCleaner> {
    backend: B,
    cleaner: C,
    config: PipelineConfig,
    ffmpeg: Option<String>,
    cancel: Option<CancellationToken>,
}

impl ReadAloudPipelineBuilder {
    /// Each run gets its own scratch namespace under `scratch_root`
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            backend: (),
            cleaner: PassthroughCleaner,
            config: PipelineConfig {
                scratch_root: Some(scratch_root.into()),
                ..PipelineConfig::default()
            },
            ffmpeg: None,
            cancel: None,
        }
    }
}

impl<B, C> ReadAloudPipelineBuilder<B, C> {
    pub fn backend<B2: SpeechBackend + Send + Sync + 'static>(
        self,
        backend: B2,
    ) -> ReadAloudPipelineBuilder<B2, C> {
        ReadAloudPipelineBuilder {
            backend,
            cleaner: self.cleaner,
            config: self.config,
            ffmpeg: self.ffmpeg,
            cancel: self.cancel,
        }
    }

    pub fn cleaner<C2: TextCleaner + Send + Sync + 'static>(
        self,
        cleaner: C2,
    ) -> ReadAloudPipelineBuilder<B, C2> {
        ReadAloudPipelineBuilder {
            backend: self.backend,
            cleaner,
            config: self.config,
            ffmpeg: self.ffmpeg,
            cancel: self.cancel,
        }
    }

    /// Replaces the whole configuration. The scratch root given to
    /// [`ReadAloudPipelineBuilder::new`] is kept unless `config` sets one.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        let scratch_root = config.scratch_root.clone().or(self.config.scratch_root);
        self.config = PipelineConfig {
            scratch_root,
            ..config
        };
        self
    }

    pub fn chunk_policy(mut self, chunk_policy: ChunkPolicy) -> Self {
        self.config.chunk_policy = chunk_policy;
        self
    }

    pub fn crossfade(mut self, crossfade: CrossfadeSpec) -> Self {
        self.config.crossfade = crossfade;
        self
    }

    pub fn voice(mut self, voice: VoiceConfig) -> Self {
        self.config.voice = voice;
        self
    }

    pub fn stop_markers(mut self, stop_markers: Vec<String>) -> Self {
        self.config.stop_markers = stop_markers;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn format(mut self, format: AudioFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn crossfade_seed(mut self, seed: u64) -> Self {
        self.config.crossfade_seed = Some(seed);
        self
    }

    /// Program used to encode MP3 artifacts, `ffmpeg` by default
    pub fn ffmpeg(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg = Some(program.into());
        self
    }

    /// Shares an existing token, e.g. one cancelled on ctrl-c
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<B, C> ReadAloudPipelineBuilder<B, C>
where
    B: SpeechBackend + Send + Sync + 'static,
    C: TextCleaner + Send + Sync + 'static,
{
    pub fn build(self) -> ReadAloudPipeline<B, C> {
        let mut merger = Merger::new(self.config.crossfade, self.config.format);
        if let Some(program) = self.ffmpeg {
            merger = merger.with_ffmpeg(program);
        }

        ReadAloudPipeline {
            synthesizer: UnitSynthesizer::new(
                self.backend,
                self.cleaner,
                self.config.voice.clone(),
                self.config.stop_markers.clone(),
            ),
            merger,
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}
