pub mod document;

use std::{fmt::Display, future::Future};

pub trait DocumentSource {
    type Error: Display;

    /// Plain text of the document at `location`, a local path or an http(s) URL.
    fn fetch_text(&self, location: &str) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
