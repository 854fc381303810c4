use std::sync::{Arc, Mutex};

use read_aloud::synth::TextCleaner;

/// Upper-cases text, or fails every call when built with `failing`
#[derive(Clone, Default)]
pub struct MockTextCleaner {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_with: Option<String>,
}

impl MockTextCleaner {
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl TextCleaner for MockTextCleaner {
    const CLEANER_NAME: &'static str = "mock-cleaner";
    type Error = anyhow::Error;

    async fn clean(&self, text: &str) -> Result<String, Self::Error> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        Ok(text.to_uppercase())
    }
}
