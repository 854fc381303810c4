use std::sync::{Arc, Mutex};

use read_aloud::search::SearchProvider;
use reqwest::Url;

#[derive(Clone)]
pub struct MockSearchProvider {
    pub results: Vec<Url>,
    pub calls: Arc<Mutex<Vec<(String, usize)>>>,
    pub fail_with: Option<String>,
}

impl MockSearchProvider {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            results: urls.iter().map(|u| Url::parse(u).unwrap()).collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::new(&[])
        }
    }
}

impl SearchProvider for MockSearchProvider {
    const PROVIDER_NAME: &'static str = "mock-search";
    type Error = anyhow::Error;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Url>, Self::Error> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), max_results));
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}
