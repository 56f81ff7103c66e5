//! Machine-translation providers.
//!
//! [`TranslationBackend`] is the seam the batch runner talks to. The HTTP
//! implementation covers Gemini and OpenAI-compatible chat completion APIs.

use std::{thread, time::Duration};

use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::project::BackendSettings;

pub trait TranslationBackend: Send + Sync {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> EngineResult<String>;

    /// Checks a key with a minimal request. Never fails; the message says why.
    fn validate_credentials(&self, api_key: &str) -> (bool, String);

    fn name(&self) -> &str;
}

const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 800;

fn backoff(attempt: usize) -> Duration {
    let jitter: u64 = thread_rng().gen_range(0..200);
    let ms = BASE_DELAY_MS * (2_u64.pow(attempt as u32)) + jitter;
    Duration::from_millis(ms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
    DeepSeek,
}

impl Provider {
    pub fn from_name(name: &str) -> EngineResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "deepseek" => Ok(Provider::DeepSeek),
            _ => Err(EngineError::Settings(format!("unsupported provider \"{name}\""))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
        }
    }
}

pub struct HttpBackend {
    client: Client,
    provider: Provider,
    model: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> EngineResult<Self> {
        let provider = Provider::from_name(&settings.provider)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EngineError::Backend(format!("failed to create HTTP client: {e}")))?;

        Ok(HttpBackend {
            client,
            provider,
            model: settings.model.clone(),
            api_key: settings.api_key.trim().to_string(),
        })
    }

    fn endpoint(&self, api_key: &str) -> String {
        match self.provider {
            Provider::Gemini => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
                self.model, api_key
            ),
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
            Provider::DeepSeek => "https://api.deepseek.com/v1/chat/completions".to_string(),
        }
    }

    fn body(&self, prompt: &str) -> Value {
        match self.provider {
            Provider::Gemini => json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }),
            Provider::OpenAi | Provider::DeepSeek => json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": "You are a professional game localization translator." },
                    { "role": "user", "content": prompt }
                ],
                "temperature": 0.3
            }),
        }
    }

    fn extract_text(&self, v: &Value) -> Option<String> {
        let text = match self.provider {
            Provider::Gemini => v
                .get("candidates")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("text"))
                .and_then(|t| t.as_str()),
            Provider::OpenAi | Provider::DeepSeek => v
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str()),
        };
        text.map(|t| t.trim().to_string())
    }

    /// Sends `prompt` with retries. `Ok("")` means the provider answered with no text.
    fn complete(&self, prompt: &str, api_key: &str) -> EngineResult<String> {
        let body = self.body(prompt);
        let mut last_err = String::from("no attempt made");

        for attempt in 0..MAX_RETRIES {
            let mut req = self.client.post(self.endpoint(api_key)).json(&body);
            if self.provider != Provider::Gemini {
                req = req.bearer_auth(api_key);
            }

            let resp = match req.send() {
                Ok(resp) => resp,
                Err(err) => {
                    last_err = err.to_string();
                    if attempt + 1 < MAX_RETRIES {
                        thread::sleep(backoff(attempt));
                    }
                    continue;
                }
            };

            let status = resp.status();
            let text = match resp.text() {
                Ok(t) => t,
                Err(err) => {
                    last_err = err.to_string();
                    thread::sleep(backoff(attempt));
                    continue;
                }
            };

            if !status.is_success() {
                last_err = extract_error_message(status, &text);
                if should_retry_http(status) && attempt + 1 < MAX_RETRIES {
                    warn!(provider = self.provider.name(), %status, attempt, "retrying request");
                    thread::sleep(backoff(attempt));
                    continue;
                }
                break;
            }

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => {
                    last_err = "Invalid JSON from provider".into();
                    if attempt + 1 < MAX_RETRIES {
                        thread::sleep(backoff(attempt));
                    }
                    continue;
                }
            };

            return Ok(self.extract_text(&json).unwrap_or_default());
        }

        Err(EngineError::Backend(last_err))
    }
}

impl TranslationBackend for HttpBackend {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> EngineResult<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        if self.api_key.is_empty() {
            return Err(EngineError::Backend("API key is not configured".into()));
        }

        let prompt = build_prompt(text, source_lang, target_lang);
        debug!(provider = self.provider.name(), chars = text.len(), "translation request");

        let out = self.complete(&prompt, &self.api_key)?;
        if out.is_empty() {
            return Err(EngineError::Backend("Empty response".into()));
        }
        Ok(out)
    }

    fn validate_credentials(&self, api_key: &str) -> (bool, String) {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return (false, "API Key cannot be empty".into());
        }

        match self.complete("Hello", api_key) {
            Ok(text) if !text.is_empty() => (true, "API Key is valid".into()),
            Ok(_) => (false, "API Key is invalid".into()),
            Err(e) => (false, format!("Verify Error: {}", backend_message(&e))),
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

/// The bare provider message, without the error-kind prefix.
pub fn backend_message(err: &EngineError) -> String {
    match err {
        EngineError::Backend(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn should_retry_http(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return format!("HTTP {}: {}", status.as_u16(), msg);
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return format!("HTTP {}: {}", status.as_u16(), msg);
        }
    }

    let trimmed = body_text.trim();
    let snippet: String = if trimmed.chars().count() > 400 {
        format!("{}...", trimmed.chars().take(400).collect::<String>())
    } else {
        trimmed.to_string()
    };

    format!("HTTP {}: {}", status.as_u16(), snippet)
}

pub fn build_prompt(text: &str, source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are a professional game localization translator. \
         Translate the following {source_lang} text into {target_lang}. \
         Rules:\n\
         1. Keep technical variables (like %(points)s, %s, {{0}}) unchanged.\n\
         2. Maintain the gaming context and tone.\n\
         3. Output ONLY the translated text, no explanations or extra quotes.\n\
         4. If the text is an ID or code, keep it as is.\n\n\
         Text: {text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backend(provider: &str) -> HttpBackend {
        HttpBackend::new(&BackendSettings {
            provider: provider.into(),
            ..BackendSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn provider_names() {
        assert_eq!(Provider::from_name(" Gemini ").unwrap(), Provider::Gemini);
        assert_eq!(Provider::from_name("deepseek").unwrap(), Provider::DeepSeek);
        assert!(matches!(
            Provider::from_name("babelfish"),
            Err(EngineError::Settings(_))
        ));
    }

    #[test]
    fn prompt_keeps_placeholders_rule() {
        let p = build_prompt("Привет, %s", "Russian", "Chinese");
        assert!(p.contains("Translate the following Russian text into Chinese."));
        assert!(p.contains("{0}"));
        assert!(p.ends_with("Text: Привет, %s"));
    }

    #[test]
    fn extracts_text_per_provider() {
        let gemini = json!({"candidates":[{"content":{"parts":[{"text":"  你好 \n"}]}}]});
        assert_eq!(backend("gemini").extract_text(&gemini).as_deref(), Some("你好"));

        let chat = json!({"choices":[{"message":{"content":"你好"}}]});
        assert_eq!(backend("openai").extract_text(&chat).as_deref(), Some("你好"));
        assert_eq!(backend("openai").extract_text(&gemini), None);
    }

    #[test]
    fn error_bodies_are_summarised() {
        let msg = extract_error_message(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"API key not valid"}}"#,
        );
        assert_eq!(msg, "HTTP 400: API key not valid");

        let msg = extract_error_message(StatusCode::BAD_GATEWAY, "  upstream down ");
        assert_eq!(msg, "HTTP 502: upstream down");
        assert!(should_retry_http(StatusCode::TOO_MANY_REQUESTS));
        assert!(!should_retry_http(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn blank_input_and_keys_need_no_request() {
        let b = backend("gemini");
        assert_eq!(b.translate("   ", "ru", "zh").unwrap(), "");
        assert!(matches!(b.translate("text", "ru", "zh"), Err(EngineError::Backend(_))));
        assert_eq!(
            b.validate_credentials("  "),
            (false, "API Key cannot be empty".to_string())
        );
    }
}
