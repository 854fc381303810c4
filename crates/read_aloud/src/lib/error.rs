use segment_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },
    #[error("Cannot merge zero segments")]
    EmptyMerge,
    #[error("Document produced no text units")]
    NoContent,
    #[error("Synthesis produced no audio segments")]
    NoAudioProduced,
    #[error("Segment {index} has sample rate {found}, expected {expected}")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },
    #[error("Run was cancelled")]
    Cancelled,
    #[error("Segment store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn collaborator(collaborator: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            collaborator,
            message: error.to_string(),
        }
    }

    /// Configuration problems are fatal and never worth retrying
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
