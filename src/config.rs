//! Runtime configuration, read from the environment (and a `.env` file when present).

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Up from the client-library default of 2.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Settings for the HTTP client talking to the vector store API.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub max_retries: u32,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Config with defaults for everything except the key and endpoint.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            base_url: base_url.into(),
            organization: None,
            project: None,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// Hand-written so the API key never reaches logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub vector_store_id: String,
    pub client: ClientConfig,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
            debug!("OPENAI_API_KEY environment variable not set");
            ConfigError::Missing("OPENAI_API_KEY")
        })?;
        let vector_store_id = get("VECTOR_STORE_ID").ok_or_else(|| {
            debug!("VECTOR_STORE_ID environment variable not set");
            ConfigError::Missing("VECTOR_STORE_ID")
        })?;

        let base_url = get("OPENAI_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        let number = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            match get(name) {
                None => Ok(None),
                Some(value) => value.trim().parse::<u64>().map(Some).map_err(|e| {
                    debug!(error = %e, var = name, value = %value, "Invalid numeric setting");
                    ConfigError::InvalidNumber { name, value }
                }),
            }
        };

        let max_retries = match number("OPENAI_MAX_RETRIES")? {
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::InvalidNumber {
                name: "OPENAI_MAX_RETRIES",
                value: n.to_string(),
            })?,
            None => DEFAULT_MAX_RETRIES,
        };
        let timeout = number("OPENAI_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let poll_interval = number("OPENAI_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let client = ClientConfig {
            api_key,
            base_url,
            organization: get("OPENAI_ORG_ID"),
            project: get("OPENAI_PROJECT_ID"),
            max_retries,
            timeout,
            poll_interval,
        };

        info!(
            vector_store_id = %vector_store_id,
            base_url = %client.base_url,
            max_retries = client.max_retries,
            "Configuration loaded"
        );
        debug!(?client, "Client configuration (full debug)");

        Ok(Config {
            vector_store_id,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn required_only_uses_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VECTOR_STORE_ID", "vs_123"),
        ]))
        .expect("config should load");

        assert_eq!(config.vector_store_id, "vs_123");
        assert_eq!(config.client.api_key, "sk-test");
        assert_eq!(config.client.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.client.max_retries, 5);
        assert_eq!(config.client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.client.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.client.organization.is_none());
    }

    #[test]
    fn missing_api_key_is_reported_first() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY"));
        assert_eq!(err.to_string(), "OPENAI_API_KEY is not set");
    }

    #[test]
    fn empty_vector_store_id_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VECTOR_STORE_ID", ""),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("VECTOR_STORE_ID"));
    }

    #[test]
    fn optional_overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VECTOR_STORE_ID", "vs_123"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("OPENAI_ORG_ID", "org-1"),
            ("OPENAI_PROJECT_ID", "proj-1"),
            ("OPENAI_MAX_RETRIES", "0"),
            ("OPENAI_TIMEOUT_SECS", "30"),
            ("OPENAI_POLL_INTERVAL_MS", "25"),
        ]))
        .unwrap();

        assert_eq!(config.client.base_url, "http://localhost:8080/v1");
        assert_eq!(config.client.organization.as_deref(), Some("org-1"));
        assert_eq!(config.client.project.as_deref(), Some("proj-1"));
        assert_eq!(config.client.max_retries, 0);
        assert_eq!(config.client.timeout, Duration::from_secs(30));
        assert_eq!(config.client.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn rejects_non_numeric_retry_count() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VECTOR_STORE_ID", "vs_123"),
            ("OPENAI_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { name: "OPENAI_MAX_RETRIES", .. }
        ));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let client = ClientConfig::new("sk-secret", DEFAULT_BASE_URL);
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        std::env::set_var("OPENAI_API_KEY", "sk-env");
        std::env::set_var("VECTOR_STORE_ID", "vs_env");
        std::env::remove_var("OPENAI_BASE_URL");

        let config = Config::from_env().expect("env config should load");
        assert_eq!(config.vector_store_id, "vs_env");
        assert_eq!(config.client.api_key, "sk-env");

        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("VECTOR_STORE_ID");
    }
}
