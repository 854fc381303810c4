pub mod batch;
pub mod chunker;
mod error;
pub mod llm;
pub mod merger;
mod pipeline;
pub mod research;
pub mod search;
pub mod source;
pub mod synth;
#[cfg(test)]
mod test_support;
pub mod tracing;

pub use error::PipelineError;
pub use llm::{ollama, LengthBounds, Reasoner, Summarizer, SummaryResponse};
pub use pipeline::{
    builder::ReadAloudPipelineBuilder, PipelineConfig, ReadAloudPipeline, RunReport, RunRequest,
    RunState,
};
