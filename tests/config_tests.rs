use std::{collections::HashMap, path::PathBuf, time::Duration};

use graphqa::{
    config::{ConfigError, DEFAULT_OLLAMA_MODEL, GraphQaConfig, LlmProvider},
    validator::WritePolicy,
};

fn config_from(pairs: &[(&str, &str)]) -> Result<GraphQaConfig, ConfigError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    GraphQaConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn test_defaults_without_environment() {
    let config = config_from(&[]).expect("config");
    assert_eq!(config, GraphQaConfig::default());
    assert_eq!(config.llm.provider, LlmProvider::OpenAi);
    assert_eq!(config.llm.temperature, 0.1);
    assert_eq!(config.pipeline.max_context_rows, 50);
    assert_eq!(config.pipeline.write_policy, WritePolicy::Warn);
    assert!(config.store.db_path.is_none());
}

#[test]
fn test_environment_overrides() {
    let config = config_from(&[
        ("GRAPHQA_DB", "/tmp/graph.db"),
        ("GRAPHQA_QUERY_TIMEOUT_MS", "1500"),
        ("GRAPHQA_LLM_PROVIDER", "ollama"),
        ("OLLAMA_HOST", "127.0.0.1:11434"),
        ("GRAPHQA_TEMPERATURE", "0.7"),
        ("GRAPHQA_SCHEMA_TTL_MS", "0"),
        ("GRAPHQA_MAX_CONTEXT_ROWS", "10"),
        ("GRAPHQA_WRITE_POLICY", "reject"),
    ])
    .expect("config");
    assert_eq!(config.store.db_path, Some(PathBuf::from("/tmp/graph.db")));
    assert_eq!(config.pipeline.query_timeout, Duration::from_millis(1500));
    assert_eq!(config.llm.provider, LlmProvider::Ollama);
    assert_eq!(config.llm.model, DEFAULT_OLLAMA_MODEL);
    assert_eq!(config.llm.base_url.as_deref(), Some("127.0.0.1:11434"));
    assert_eq!(config.pipeline.schema_ttl, Duration::ZERO);
    assert_eq!(config.pipeline.max_context_rows, 10);
    assert_eq!(config.pipeline.write_policy, WritePolicy::Reject);
}

#[test]
fn test_invalid_values_are_rejected() {
    for (key, value) in [
        ("GRAPHQA_QUERY_TIMEOUT_MS", "soon"),
        ("GRAPHQA_QUERY_TIMEOUT_MS", "0"),
        ("GRAPHQA_LLM_PROVIDER", "bard"),
        ("GRAPHQA_TEMPERATURE", "3.5"),
        ("GRAPHQA_MAX_CONTEXT_ROWS", "0"),
        ("GRAPHQA_WRITE_POLICY", "allow"),
    ] {
        assert!(
            matches!(config_from(&[(key, value)]), Err(ConfigError::Invalid { .. })),
            "{key}={value}"
        );
    }
}

#[test]
fn test_openai_generator_requires_key() {
    let config = config_from(&[]).expect("config");
    assert_eq!(
        config.build_generator().err(),
        Some(ConfigError::Missing("OPENAI_API_KEY"))
    );
    let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).expect("config");
    assert!(config.build_generator().is_ok());
}

#[test]
fn test_memory_db_keyword() {
    let config = config_from(&[("GRAPHQA_DB", "memory")]).expect("config");
    assert!(config.store.db_path.is_none());
}
