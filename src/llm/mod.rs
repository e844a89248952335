//! Text generation clients. The pipeline only sees [`TextGenerator`].

mod ollama;
mod openai;

use std::{sync::Arc, time::Duration};

pub use ollama::{DEFAULT_HOST, OllamaGenerator};
pub use openai::{DEFAULT_BASE_URL, OpenAiGenerator};

use crate::errors::GenerationError;

pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

impl<T> TextGenerator for &T
where
    T: TextGenerator + ?Sized,
{
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}

impl<T> TextGenerator for Box<T>
where
    T: TextGenerator + ?Sized,
{
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}

impl<T> TextGenerator for Arc<T>
where
    T: TextGenerator + ?Sized,
{
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, GenerationError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GenerationError::request(format!("failed to build http client: {e}")))
}

fn send_error(err: reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::request(err.to_string())
    }
}

/// Fails on non-success status, keeping the body for the error message.
fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(GenerationError::Api {
        status: status.as_u16(),
        body,
    })
}

fn non_empty(content: String) -> Result<String, GenerationError> {
    if content.trim().is_empty() {
        Err(GenerationError::Empty)
    } else {
        Ok(content)
    }
}
