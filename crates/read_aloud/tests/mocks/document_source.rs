use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use read_aloud::source::DocumentSource;

#[derive(Clone, Default)]
pub struct MockDocumentSource {
    pub documents: HashMap<String, String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockDocumentSource {
    pub fn new(documents: &[(&str, &str)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(location, text)| (location.to_string(), text.to_string()))
                .collect(),
            ..Default::default()
        }
    }
}

impl DocumentSource for MockDocumentSource {
    type Error = anyhow::Error;

    async fn fetch_text(&self, location: &str) -> Result<String, Self::Error> {
        self.calls.lock().unwrap().push(location.to_string());
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no document at {}", location))
    }
}
