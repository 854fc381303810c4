pub mod document_source;
pub mod search_provider;
pub mod speech_backend;
pub mod summarizer;
pub mod text_cleaner;
