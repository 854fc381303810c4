//! # Merger
//!
//! Concatenates the ordered segments of a run into one artifact, blending
//! every adjacent pair over a randomly drawn crossfade.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};

use itertools::Itertools;
use rand::Rng;
use rayon::prelude::*;
use segment_store::{wav, AudioSegment, SegmentStore};
use tempfile::NamedTempFile;

use crate::error::PipelineError;

/// Inclusive range the crossfade of each adjacent pair is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeSpec {
    pub min_ms: u32,
    pub max_ms: u32,
}

impl Default for CrossfadeSpec {
    fn default() -> Self {
        Self {
            min_ms: 200,
            max_ms: 1000,
        }
    }
}

impl CrossfadeSpec {
    pub fn new(min_ms: u32, max_ms: u32) -> Result<Self, PipelineError> {
        let spec = Self { min_ms, max_ms };
        spec.validate()?;
        Ok(spec)
    }

    pub fn fixed(ms: u32) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.min_ms > self.max_ms {
            return Err(PipelineError::config(format!(
                "crossfade min_ms ({}) exceeds max_ms ({})",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min_ms..=self.max_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(format!("unsupported audio format `{other}`, expected wav or mp3")),
        }
    }
}

/// The merged output of a run; the only thing a run leaves on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    /// Crossfade drawn for each adjacent pair, in merge order
    pub crossfades_ms: Vec<u32>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct Merger {
    crossfade: CrossfadeSpec,
    format: AudioFormat,
    ffmpeg: String,
}

impl Merger {
    pub fn new(crossfade: CrossfadeSpec, format: AudioFormat) -> Self {
        Self {
            crossfade,
            format,
            ffmpeg: "ffmpeg".into(),
        }
    }

    /// Program used to encode MP3 output
    pub fn with_ffmpeg(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg = program.into();
        self
    }

    pub fn crossfade(&self) -> CrossfadeSpec {
        self.crossfade
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Merges `segments` into `output` and then deletes every segment held by
    /// `store`, whether or not the merge succeeded.
    ///
    /// `output` is only created once the whole merge has succeeded.
    #[tracing::instrument(skip_all, fields(segments = segments.len(), output = ?output))]
    pub fn merge<S, R>(
        &self,
        store: &mut S,
        segments: &[AudioSegment],
        output: &Path,
        rng: &mut R,
    ) -> Result<MergedArtifact, PipelineError>
    where
        S: SegmentStore + Sync,
        R: Rng + ?Sized,
    {
        let result = self.merge_segments(&*store, segments, output, rng);
        let cleanup = store.delete_all();

        match (result, cleanup) {
            (Ok(artifact), Ok(())) => {
                tracing::info!(
                    path = ?artifact.path,
                    duration_secs = artifact.duration_secs,
                    "Merged audio saved"
                );
                Ok(artifact)
            }
            (Ok(artifact), Err(e)) => {
                tracing::error!(error = ?e, "Failed to delete segments after merge");
                if let Err(e) = fs::remove_file(&artifact.path) {
                    tracing::warn!(error = ?e, path = ?artifact.path, "Failed to remove artifact");
                }
                Err(e.into())
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::warn!(error = ?cleanup_err, "Failed to delete segments after failed merge");
                }
                tracing::error!(error = %e, "Merge failed");
                Err(e)
            }
        }
    }

    fn merge_segments<S, R>(
        &self,
        store: &S,
        segments: &[AudioSegment],
        output: &Path,
        rng: &mut R,
    ) -> Result<MergedArtifact, PipelineError>
    where
        S: SegmentStore + Sync,
        R: Rng + ?Sized,
    {
        self.crossfade.validate()?;

        let ordered = segments
            .iter()
            .sorted_by_key(|s| s.index)
            .collect::<Vec<_>>();
        let Some(first) = ordered.first() else {
            return Err(PipelineError::EmptyMerge);
        };

        let sample_rate = first.sample_rate;
        if let Some(other) = ordered.iter().find(|s| s.sample_rate != sample_rate) {
            return Err(PipelineError::SampleRateMismatch {
                index: other.index,
                expected: sample_rate,
                found: other.sample_rate,
            });
        }

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        if ordered.len() == 1 {
            return self.export_single(first, parent, output);
        }

        let buffers = ordered
            .par_iter()
            .map(|segment| store.load(segment))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((segment, buffer)) = ordered
            .iter()
            .zip(&buffers)
            .find(|(_, b)| b.sample_rate != sample_rate)
        {
            return Err(PipelineError::SampleRateMismatch {
                index: segment.index,
                expected: sample_rate,
                found: buffer.sample_rate,
            });
        }

        let mut buffers = buffers.into_iter();
        let mut combined = buffers.next().map(|b| b.samples).unwrap_or_default();
        let mut crossfades_ms = Vec::with_capacity(ordered.len() - 1);

        for next in buffers {
            let crossfade_ms = self.crossfade.draw(rng);
            crossfades_ms.push(crossfade_ms);
            append_with_crossfade(
                &mut combined,
                &next.samples,
                ms_to_samples(crossfade_ms, sample_rate),
            );
        }

        let mut staged = NamedTempFile::new_in(parent)?;
        wav::write_mono(staged.path(), &combined, sample_rate)?;
        if self.format == AudioFormat::Mp3 {
            staged = self.transcode_mp3(staged.path(), parent)?;
        }
        staged.persist(output).map_err(|e| e.error)?;

        Ok(MergedArtifact {
            path: output.to_path_buf(),
            format: self.format,
            crossfades_ms,
            duration_secs: combined.len() as f64 / sample_rate as f64,
        })
    }

    /// A single segment is exported as is, without any crossfade
    fn export_single(
        &self,
        segment: &AudioSegment,
        parent: &Path,
        output: &Path,
    ) -> Result<MergedArtifact, PipelineError> {
        let frames = hound::WavReader::open(&segment.path)?.duration();

        let staged = match self.format {
            AudioFormat::Wav => {
                let staged = NamedTempFile::new_in(parent)?;
                fs::copy(&segment.path, staged.path())?;
                staged
            }
            AudioFormat::Mp3 => self.transcode_mp3(&segment.path, parent)?,
        };
        staged.persist(output).map_err(|e| e.error)?;

        Ok(MergedArtifact {
            path: output.to_path_buf(),
            format: self.format,
            crossfades_ms: Vec::new(),
            duration_secs: frames as f64 / segment.sample_rate as f64,
        })
    }

    fn transcode_mp3(&self, wav_path: &Path, parent: &Path) -> Result<NamedTempFile, PipelineError> {
        let staged = tempfile::Builder::new().suffix(".mp3").tempfile_in(parent)?;

        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(wav_path)
            .args(["-codec:a", "libmp3lame", "-q:a", "2", "-f", "mp3"])
            .arg(staged.path())
            .output()
            .map_err(|e| PipelineError::collaborator("ffmpeg", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::collaborator(
                "ffmpeg",
                stderr.lines().last().unwrap_or("unknown error"),
            ));
        }

        Ok(staged)
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Appends `next` to `combined`, overlapping the last `overlap` samples of
/// `combined` with the first of `next` under a linear fade. The overlap is
/// clamped to the shorter of the two buffers.
pub fn append_with_crossfade(combined: &mut Vec<f32>, next: &[f32], overlap: usize) {
    let overlap = overlap.min(combined.len()).min(next.len());
    let start = combined.len() - overlap;

    for (i, (acc, incoming)) in combined[start..].iter_mut().zip(next).enumerate() {
        let t = (i + 1) as f32 / (overlap + 1) as f32;
        *acc = *acc * (1.0 - t) + incoming * t;
    }
    combined.extend_from_slice(&next[overlap..]);
}
