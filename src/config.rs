//! Runtime configuration read from the environment.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    errors::GenerationError,
    executor::DEFAULT_QUERY_TIMEOUT,
    llm::{DEFAULT_BASE_URL, DEFAULT_HOST, OllamaGenerator, OpenAiGenerator, TextGenerator},
    pipeline::{DEFAULT_SCHEMA_TIMEOUT, DEFAULT_SCHEMA_TTL, PipelineOptions},
    synthesizer::DEFAULT_MAX_CONTEXT_ROWS,
    validator::WritePolicy,
};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("{0} is required")]
    Missing(&'static str),
}

impl ConfigError {
    fn invalid<T: Into<String>>(key: &'static str, reason: T) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!("unknown provider `{other}` (expected openai|ollama)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// `None` keeps the graph in memory.
    pub db_path: Option<PathBuf>,
    pub query_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// OpenAI base URL or Ollama host, depending on `provider`.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphQaConfig {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineOptions,
}

impl Default for GraphQaConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                db_path: None,
                query_timeout: DEFAULT_QUERY_TIMEOUT,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                model: DEFAULT_MODEL.to_string(),
                base_url: None,
                api_key: None,
                temperature: DEFAULT_TEMPERATURE,
                timeout: DEFAULT_LLM_TIMEOUT,
            },
            pipeline: PipelineOptions {
                query_timeout: DEFAULT_QUERY_TIMEOUT,
                schema_ttl: DEFAULT_SCHEMA_TTL,
                schema_timeout: DEFAULT_SCHEMA_TIMEOUT,
                max_context_rows: DEFAULT_MAX_CONTEXT_ROWS,
                write_policy: WritePolicy::Warn,
            },
        }
    }
}

impl GraphQaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = GraphQaConfig::default();

        if let Some(path) = get("GRAPHQA_DB") {
            config.store.db_path = match path.trim() {
                "memory" | ":memory:" => None,
                other => Some(PathBuf::from(other)),
            };
        }
        if let Some(raw) = get("GRAPHQA_QUERY_TIMEOUT_MS") {
            let timeout = millis("GRAPHQA_QUERY_TIMEOUT_MS", &raw)?;
            config.store.query_timeout = timeout;
            config.pipeline.query_timeout = timeout;
        }

        if let Some(raw) = get("GRAPHQA_LLM_PROVIDER") {
            config.llm.provider = raw
                .parse()
                .map_err(|e: String| ConfigError::invalid("GRAPHQA_LLM_PROVIDER", e))?;
        }
        config.llm.model = match (get("GRAPHQA_MODEL"), config.llm.provider) {
            (Some(model), _) => model.trim().to_string(),
            (None, LlmProvider::Ollama) => DEFAULT_OLLAMA_MODEL.to_string(),
            (None, LlmProvider::OpenAi) => DEFAULT_MODEL.to_string(),
        };
        config.llm.api_key = get("OPENAI_API_KEY");
        config.llm.base_url = match config.llm.provider {
            LlmProvider::OpenAi => get("OPENAI_BASE_URL"),
            LlmProvider::Ollama => get("OLLAMA_HOST"),
        };
        if let Some(raw) = get("GRAPHQA_TEMPERATURE") {
            let temperature: f32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("GRAPHQA_TEMPERATURE", format!("`{raw}` is not a number")))?;
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::invalid(
                    "GRAPHQA_TEMPERATURE",
                    "must be between 0 and 2",
                ));
            }
            config.llm.temperature = temperature;
        }
        if let Some(raw) = get("GRAPHQA_LLM_TIMEOUT_MS") {
            config.llm.timeout = millis("GRAPHQA_LLM_TIMEOUT_MS", &raw)?;
        }

        if let Some(raw) = get("GRAPHQA_SCHEMA_TTL_MS") {
            config.pipeline.schema_ttl = Duration::from_millis(number("GRAPHQA_SCHEMA_TTL_MS", &raw)?);
        }
        if let Some(raw) = get("GRAPHQA_MAX_CONTEXT_ROWS") {
            let rows = number("GRAPHQA_MAX_CONTEXT_ROWS", &raw)?;
            if rows == 0 {
                return Err(ConfigError::invalid(
                    "GRAPHQA_MAX_CONTEXT_ROWS",
                    "must be at least 1",
                ));
            }
            config.pipeline.max_context_rows = usize::try_from(rows)
                .map_err(|_| ConfigError::invalid("GRAPHQA_MAX_CONTEXT_ROWS", "too large"))?;
        }
        if let Some(raw) = get("GRAPHQA_WRITE_POLICY") {
            config.pipeline.write_policy = raw
                .parse()
                .map_err(|e: String| ConfigError::invalid("GRAPHQA_WRITE_POLICY", e))?;
        }
        Ok(config)
    }

    /// Builds the configured text generator. OpenAI requires an API key.
    pub fn build_generator(&self) -> Result<Box<dyn TextGenerator>, ConfigError> {
        let llm = &self.llm;
        let built: Result<Box<dyn TextGenerator>, GenerationError> = match llm.provider {
            LlmProvider::OpenAi => {
                let api_key = llm.api_key.clone().ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
                OpenAiGenerator::new(
                    llm.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                    Some(api_key),
                    &llm.model,
                    llm.temperature,
                    llm.timeout,
                )
                .map(|g| Box::new(g) as Box<dyn TextGenerator>)
            }
            LlmProvider::Ollama => OllamaGenerator::new(
                llm.base_url.as_deref().unwrap_or(DEFAULT_HOST),
                &llm.model,
                llm.temperature,
                llm.timeout,
            )
            .map(|g| Box::new(g) as Box<dyn TextGenerator>),
        };
        built.map_err(|e| ConfigError::invalid("llm", e.to_string()))
    }
}

fn number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("`{raw}` is not a non-negative integer")))
}

fn millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match number(key, raw)? {
        0 => Err(ConfigError::invalid(key, "must be greater than zero")),
        ms => Ok(Duration::from_millis(ms)),
    }
}
