use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::{store::SegmentStore, wav, AudioBuffer, AudioSegment, StoreError};

/// Segment store backed by a private temporary directory.
///
/// Every store gets its own namespace under the scratch root, so concurrent
/// runs never see each other's segments. The namespace is removed when the
/// store is dropped.
#[derive(Debug)]
pub struct ScratchSegmentStore {
    dir: TempDir,
    segments: BTreeMap<usize, AudioSegment>,
}

impl ScratchSegmentStore {
    /// Creates a namespace under the system temp directory
    pub fn new(run_label: &str) -> Result<Self, StoreError> {
        Self::new_in(std::env::temp_dir(), run_label)
    }

    /// Creates a namespace under `root`, creating `root` if needed
    pub fn new_in(root: impl AsRef<Path>, run_label: &str) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize_label(run_label)))
            .tempdir_in(root)
            .inspect_err(|e| tracing::error!(error = ?e, root = ?root, "Failed to create scratch namespace"))?;

        tracing::debug!(path = ?dir.path(), "Created scratch namespace");

        Ok(Self {
            dir,
            segments: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("segment_{index:05}.wav"))
    }
}

impl SegmentStore for ScratchSegmentStore {
    #[tracing::instrument(skip(self, samples), fields(samples = samples.len()))]
    fn put(
        &mut self,
        index: usize,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<AudioSegment, StoreError> {
        if self.segments.contains_key(&index) {
            return Err(StoreError::DuplicateIndex(index));
        }

        let path = self.segment_path(index);
        if let Err(e) = wav::write_mono(&path, samples, sample_rate) {
            tracing::error!(error = ?e, path = ?path, "Failed to write segment");
            // never leave a half-written segment behind
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        let segment = AudioSegment {
            index,
            path,
            sample_rate,
            duration: Some(samples.len() as f64 / sample_rate as f64),
        };
        self.segments.insert(index, segment.clone());

        Ok(segment)
    }

    fn list(&self) -> Vec<AudioSegment> {
        self.segments.values().cloned().collect()
    }

    fn load(&self, segment: &AudioSegment) -> Result<AudioBuffer, StoreError> {
        if !self.segments.contains_key(&segment.index) {
            return Err(StoreError::UnknownSegment(segment.index));
        }
        wav::read_mono(&segment.path)
    }

    fn delete_all(&mut self) -> Result<(), StoreError> {
        let mut first_error = None;

        for (index, segment) in std::mem::take(&mut self.segments) {
            match fs::remove_file(&segment.path) {
                Ok(()) => tracing::trace!(index, "Deleted segment"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(error = ?e, path = ?segment.path, "Failed to delete segment");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchSegmentStore {
    fn drop(&mut self) {
        if let Err(e) = self.delete_all() {
            tracing::warn!(error = ?e, path = ?self.dir.path(), "Failed to clean up segments");
        }
        // TempDir removes the namespace directory itself
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(48)
        .collect();

    if cleaned.is_empty() {
        "run".into()
    } else {
        cleaned
    }
}
