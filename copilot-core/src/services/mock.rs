//! Deterministic backend for tests: no network, no keys.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::services::backend::TranslationBackend;

#[derive(Debug, Clone)]
pub enum MockMode {
    /// "text" -> "text_<target>"
    Suffix,
    /// Fixed answers; unknown text fails.
    Mappings(HashMap<String, String>),
    /// Every call fails with this message.
    Error(String),
}

#[derive(Debug)]
pub struct MockBackend {
    mode: MockMode,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(mode: MockMode) -> Self {
        MockBackend {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mappings(pairs: &[(&str, &str)]) -> Self {
        Self::new(MockMode::Mappings(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    /// Texts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl TranslationBackend for MockBackend {
    fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> EngineResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.to_string());
        }

        match &self.mode {
            MockMode::Suffix => Ok(format!("{text}_{target_lang}")),
            MockMode::Mappings(map) => map
                .get(text)
                .cloned()
                .ok_or_else(|| EngineError::Backend(format!("no mapping for \"{text}\""))),
            MockMode::Error(msg) => Err(EngineError::Backend(msg.clone())),
        }
    }

    fn validate_credentials(&self, api_key: &str) -> (bool, String) {
        if api_key == "good-key" {
            (true, "API Key is valid".into())
        } else {
            (false, "API Key is invalid".into())
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
