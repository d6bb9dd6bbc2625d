//! Configuration for the ingestion engine.
//!
//! Everything is set via environment variables:
//! - `TIDEMARK_SECRET` - Required. Passphrase the token cipher key is derived from.
//! - `TIDEMARK_DB` - Optional. SQLite database path. Defaults to `tidemark.db`.
//! - `TIDEMARK_BLOB_DIR` - Optional. Blob backend root. Defaults to `blobs`.
//! - `FETCH_INTERVAL_SECS` - Optional. Scheduler period. Defaults to `900`.
//! - `PROVIDER_TIMEOUT_SECS` - Optional. Per-adapter fetch deadline. Defaults to `30`.
//! - `WORKER_CONCURRENCY` - Optional. Max in-flight account fetches. Defaults to `8`.
//! - `CIRCUIT_THRESHOLD` - Optional. Failures before the circuit opens. Defaults to `3`.
//! - `CIRCUIT_COOLDOWN_SECS` - Optional. Circuit-open duration. Defaults to `300`.
//! - `REDDIT_MAX_POSTS` / `REDDIT_MAX_COMMENTS` - Optional. Pagination caps. Default `1000`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Passphrase the credential cipher key is derived from
    pub secret: String,

    /// SQLite database path
    pub db_path: PathBuf,

    /// Filesystem blob backend root
    pub blob_dir: PathBuf,

    /// How often the binary triggers an ingestion run
    pub fetch_interval: Duration,

    /// Per-adapter fetch deadline
    pub provider_timeout: Duration,

    /// Maximum in-flight account fetches per invocation
    pub worker_concurrency: usize,

    /// Consecutive failures before the circuit opens
    pub circuit_threshold: u32,

    /// Circuit-open cooldown
    pub circuit_cooldown: Duration,

    /// Link-aggregator pagination caps
    pub reddit_max_posts: usize,
    pub reddit_max_comments: usize,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `TIDEMARK_SECRET` is not set.
    /// The secret is required up front: without it no stored token can be
    /// decrypted and every invocation would be fatal anyway.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var("TIDEMARK_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("TIDEMARK_SECRET".to_string()))?;

        let db_path = std::env::var("TIDEMARK_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("tidemark.db"));

        let blob_dir = std::env::var("TIDEMARK_BLOB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("blobs"));

        Ok(Self {
            secret,
            db_path,
            blob_dir,
            fetch_interval: Duration::from_secs(env_parse("FETCH_INTERVAL_SECS", 900u64)?),
            provider_timeout: Duration::from_secs(env_parse("PROVIDER_TIMEOUT_SECS", 30u64)?),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 8usize)?,
            circuit_threshold: env_parse("CIRCUIT_THRESHOLD", 3u32)?,
            circuit_cooldown: Duration::from_secs(env_parse("CIRCUIT_COOLDOWN_SECS", 300u64)?),
            reddit_max_posts: env_parse("REDDIT_MAX_POSTS", 1000usize)?,
            reddit_max_comments: env_parse("REDDIT_MAX_COMMENTS", 1000usize)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let parsed: u64 = env_parse("TIDEMARK_TEST_UNSET_VAR", 900u64).unwrap();
        assert_eq!(parsed, 900);
    }

    #[test]
    fn invalid_value_is_reported_with_name() {
        std::env::set_var("TIDEMARK_TEST_BAD_VAR", "not-a-number");
        let err = env_parse::<u64>("TIDEMARK_TEST_BAD_VAR", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "TIDEMARK_TEST_BAD_VAR"));
        std::env::remove_var("TIDEMARK_TEST_BAD_VAR");
    }
}
