use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{TextGenerator, check_status, http_client, non_empty, send_error};
use crate::errors::GenerationError;

pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Ollama native `/api/chat` client, non-streaming.
pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    host: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

impl OllamaGenerator {
    pub fn new(
        host: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client(timeout)?,
            host: normalize_host(host),
            model: model.to_string(),
            temperature,
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// `OLLAMA_HOST` is often given without a scheme (`127.0.0.1:11434`).
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

impl TextGenerator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.host);
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
            "options": { "temperature": self.temperature },
        });
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama chat request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| send_error(e, self.timeout))?;
        let parsed: ChatResponse = check_status(response)?.json().map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout)
            } else {
                GenerationError::invalid_response(e.to_string())
            }
        })?;
        non_empty(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_without_scheme_gets_http() {
        assert_eq!(normalize_host("127.0.0.1:11434/"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("https://ollama.local"), "https://ollama.local");
    }
}
