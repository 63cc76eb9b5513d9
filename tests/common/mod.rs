#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::io;

use ai_advisor::{CatalogIndex, transcript::TranscriptSink};

/// Catalog whose providers all point at one mock server.
///
/// Selector order: 1 gpt-4o, 2 o1-mini, 3 claude-3-5-sonnet-20241022,
/// 4 gemini-1.5-pro, 5 llama-3, 6 claude-3-haiku (under a provider block
/// named after a different vendor).
pub fn catalog_for(base: &str) -> Arc<CatalogIndex> {
    let document = format!(
        r#"
        [[providers]]
        name = "openai"
        url = "{base}/v1/chat/completions"
        key = "sk-openai"
        [[providers.models]]
        name = "gpt-4o"
        timeout = 5
        [[providers.models]]
        name = "o1-mini"
        timeout = 1

        [[providers]]
        name = "anthropic"
        url = "{base}/v1/messages"
        key = "sk-ant"
        [[providers.models]]
        name = "claude-3-5-sonnet-20241022"
        max_tokens = 8192

        [[providers]]
        name = "google"
        url = "{base}/v1beta/models/"
        key = "AIza-test"
        [[providers.models]]
        name = "gemini-1.5-pro"

        [[providers]]
        name = "local"
        url = "{base}/local"
        key = "none"
        [[providers.models]]
        name = "llama-3"

        [[providers]]
        name = "deepseek"
        url = "{base}/mixed"
        key = "sk-mixed"
        [[providers.models]]
        name = "claude-3-haiku"
        "#
    );
    Arc::new(CatalogIndex::from_toml_str(&document).expect("test catalog"))
}

/// Small in-memory catalog for tests that never touch the network
pub fn offline_catalog() -> Arc<CatalogIndex> {
    catalog_for("http://127.0.0.1:9")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Conversation { user: String, assistant: String, model: String, tokens: u64 },
    Event(String),
}

/// Transcript sink that keeps every call in memory
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Entry>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }
}

impl TranscriptSink for RecordingSink {
    fn log_conversation(&self, user: &str, assistant: &str, model: &str, tokens: u64) -> io::Result<()> {
        self.entries.lock().unwrap().push(Entry::Conversation {
            user: user.to_string(),
            assistant: assistant.to_string(),
            model: model.to_string(),
            tokens,
        });
        Ok(())
    }

    fn log_event(&self, message: &str) -> io::Result<()> {
        self.entries.lock().unwrap().push(Entry::Event(message.to_string()));
        Ok(())
    }
}
