use std::ops::Deref;

use itertools::Itertools;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::search::SearchProvider;

/// Search through the JSON API of a SearxNG instance.
pub struct SearxClient {
    client: Client,
    base_url: String,
}

impl Deref for SearxClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
pub struct SearxResponse {
    #[serde(default)]
    pub results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearxResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl SearxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Keeps parseable, distinct URLs in their original order.
fn collect_urls(response: SearxResponse, max_results: usize) -> Vec<Url> {
    response
        .results
        .into_iter()
        .filter_map(|r| Url::parse(&r.url).ok())
        .unique()
        .take(max_results)
        .collect()
}

impl SearchProvider for SearxClient {
    const PROVIDER_NAME: &'static str = "searxng";

    type Error = SearchError;

    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Url>, Self::Error> {
        let resp = self
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, message });
        }

        let response = resp.json::<SearxResponse>().await?;
        let urls = collect_urls(response, max_results);
        tracing::debug!(count = urls.len(), "Search returned results");

        Ok(urls)
    }
}
