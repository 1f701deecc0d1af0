use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};

use crate::models::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub revision: String,
    /// Repository to take `tokenizer.json` from when the model repo only ships a
    /// sentencepiece model.
    pub tokenizer_id: Option<String>,
    pub cache_dir: Option<String>,
    pub max_load_attempts: u32,
    pub retry_delay_secs: u64,
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
    pub max_concurrent_requests: usize,
    pub force_backend: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::default())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset or
    /// unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(lookup("PORT"), 8000u16),
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
            model: ModelConfig {
                model_id: lookup("MODEL_ID")
                    .unwrap_or_else(|| "cointegrated/rut5-base-paraphraser".to_string()),
                revision: lookup("MODEL_REVISION").unwrap_or_else(|| "main".to_string()),
                tokenizer_id: lookup("TOKENIZER_ID").filter(|s| !s.trim().is_empty()),
                cache_dir: lookup("MODEL_CACHE_DIR").filter(|s| !s.trim().is_empty()),
                max_load_attempts: parse_or(lookup("MODEL_LOAD_MAX_ATTEMPTS"), 3u32).max(1),
                retry_delay_secs: parse_or(lookup("MODEL_LOAD_RETRY_DELAY_SECS"), 5u64),
                max_input_tokens: parse_or(lookup("MAX_INPUT_TOKENS"), 256usize).max(1),
                max_output_tokens: parse_or(lookup("MAX_OUTPUT_TOKENS"), 256usize).max(1),
                max_concurrent_requests: parse_or(lookup("MAX_CONCURRENT_REQUESTS"), 4usize)
                    .max(1),
                force_backend: lookup("FORCE_GPU_BACKEND").filter(|s| !s.trim().is_empty()),
            },
        }
    }
}

impl ModelConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_load_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.model.model_id, "cointegrated/rut5-base-paraphraser");
        assert_eq!(config.model.max_load_attempts, 3);
        assert_eq!(config.model.retry_delay_secs, 5);
        assert_eq!(config.model.max_input_tokens, 256);
        assert_eq!(config.model.max_output_tokens, 256);
        assert!(config.model.force_backend.is_none());
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let config = config_from(&[
            ("PORT", "9100"),
            ("MODEL_LOAD_MAX_ATTEMPTS", "0"),
            ("MAX_CONCURRENT_REQUESTS", "not-a-number"),
            ("FORCE_GPU_BACKEND", "cpu"),
        ]);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.model.max_load_attempts, 1);
        assert_eq!(config.model.max_concurrent_requests, 4);
        assert_eq!(config.model.force_backend.as_deref(), Some("cpu"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = config_from(&[("MODEL_LOAD_RETRY_DELAY_SECS", "2")]);
        let policy = config.model.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
    }
}
