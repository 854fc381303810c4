pub mod searx;

use std::{fmt::Display, future::Future};

use reqwest::Url;

pub trait SearchProvider {
    const PROVIDER_NAME: &'static str;

    type Error: Display;

    /// Result URLs in the provider's ranking order, at most `max_results`.
    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<Url>, Self::Error>> + Send;
}
