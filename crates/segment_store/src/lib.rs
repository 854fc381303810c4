//! # Segment Store
//!
//! Scratch storage for the audio segments produced while a document is being
//! read aloud. Each pipeline run owns one store; the store places every
//! synthesized segment on disk keyed by its unit index and guarantees that
//! nothing it wrote outlives the run.
//!
//! Segments are written as mono 32-bit float WAV files through `hound`.

mod domain;
mod error;
mod store;
pub mod wav;

pub use domain::{AudioBuffer, AudioSegment};
pub use error::StoreError;
pub use store::{scratch::ScratchSegmentStore, SegmentStore};
