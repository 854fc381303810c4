#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Segment {0} already stored for this run")]
    DuplicateIndex(usize),
    #[error("Segment {0} is not held by this store")]
    UnknownSegment(usize),
    #[error("Invalid sample rate {0}")]
    InvalidSampleRate(u32),
}
