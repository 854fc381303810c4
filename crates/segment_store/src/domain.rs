use std::path::PathBuf;

/// Handle to one synthesized segment held on scratch storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Index of the text unit this segment was synthesized from
    pub index: usize,
    pub path: PathBuf,
    pub sample_rate: u32,
    /// Duration in seconds, when known
    pub duration: Option<f64>,
}

/// Decoded mono samples in the `[-1.0, 1.0]` range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
