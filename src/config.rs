use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub port: u16,
    pub upstream_base_url: Url,
    pub ai_endpoint: Url,
    pub ai_api_key: Option<String>,
    pub vector_store_endpoint: Url,
    pub vector_store_api_key: Option<String>,
    /// Bearer secret privileged routes require. `None` means authentication
    /// is not configured at all, which fails privileged requests closed
    /// (spec.md section 4.7) rather than allowing them through.
    pub trigger_secret: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default = "default_discovery_batch_size")]
    pub discovery_batch_size: usize,
    #[serde(default = "default_recently_updated_window_secs")]
    pub recently_updated_window_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BudgetConfig {
    pub vectorize_queries_daily_limit: i64,
    pub embeddings_stored_limit: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            vectorize_queries_daily_limit: 1500,
            embeddings_stored_limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    pub upstream_capacity: u32,
    pub upstream_refill_per_sec: u32,
    pub upstream_concurrency: usize,
    pub admission_requests_per_window: u32,
    pub admission_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upstream_capacity: 50,
            upstream_refill_per_sec: 50,
            upstream_concurrency: 100,
            admission_requests_per_window: 100,
            admission_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackfillConfig {
    pub stale_threshold_secs: i64,
    pub stale_min_score: i32,
    pub stale_min_descendants: i32,
    pub stale_limit: i64,
    pub ai_batch_size: i64,
    pub embedding_batch_size: i64,
    pub embedding_dimensions: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 24 * 60 * 60,
            stale_min_score: 50,
            stale_min_descendants: 20,
            stale_limit: 100,
            ai_batch_size: 50,
            embedding_batch_size: 50,
            embedding_dimensions: 768,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_owned()
}

fn default_discovery_batch_size() -> usize {
    100
}

fn default_recently_updated_window_secs() -> i64 {
    5 * 60
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Origins allowed for CORS-gated requests (spec.md section 4.7): whatever
    /// the deployment configured, plus the localhost development origin.
    pub fn cors_allow_list(&self) -> Vec<String> {
        let mut origins = self.cors_allowed_origins.clone();
        const LOCAL_DEV_ORIGIN: &str = "http://localhost:3000";
        if !origins.iter().any(|origin| origin == LOCAL_DEV_ORIGIN) {
            origins.push(LOCAL_DEV_ORIGIN.to_owned());
        }
        origins
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn cors_allow_list_always_includes_localhost() {
        let config = test_config();
        assert!(config.cors_allow_list().contains(&"http://localhost:3000".to_owned()));
        assert!(config.cors_allow_list().contains(&"https://news.example.com".to_owned()));
    }

    pub fn test_config() -> Config {
        Config {
            port: 8080,
            upstream_base_url: "https://hacker-news.firebaseio.com/v0".parse().unwrap(),
            ai_endpoint: "https://ai.example.com".parse().unwrap(),
            ai_api_key: None,
            vector_store_endpoint: "https://vectors.example.com".parse().unwrap(),
            vector_store_api_key: None,
            trigger_secret: Some("test-secret".to_owned()),
            cors_allowed_origins: vec!["https://news.example.com".to_owned()],
            log_filter: default_log_filter(),
            budget: BudgetConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backfill: BackfillConfig::default(),
            discovery_batch_size: default_discovery_batch_size(),
            recently_updated_window_secs: default_recently_updated_window_secs(),
        }
    }
}
