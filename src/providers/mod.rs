//! Provider adapters.
//!
//! A provider translates an opaque access token into a typed raw payload or
//! a tagged error. Adapters never mutate rate-limit state; the scheduler
//! inspects the error tag and applies the rate policy.

pub mod bluesky;
pub mod devpad;
pub mod github;
pub mod memory;
pub mod reddit;
pub mod twitter;
pub mod types;
pub mod youtube;

pub use memory::MemoryProvider;
pub use types::ProviderPayload;

use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Closed set of provider failures. The tag drives rate-policy handling in
/// the scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication expired: {message}")]
    AuthExpired { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse provider response: {message}")]
    Parse { message: String },

    #[error("Unknown platform: {platform}")]
    UnknownPlatform { platform: String },
}

impl ProviderError {
    /// The wait the provider asked for, when it asked for one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// A successful fetch: the raw payload plus the rate-limit counters observed
/// on the response, for the scheduler to feed into the rate policy.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub payload: ProviderPayload,
    pub rate: RateHeaders,
}

/// Capability implemented by every adapter and its in-memory double.
#[async_trait]
pub trait Provider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError>;
}

/// Dispatch table keyed by platform.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six live HTTP adapters with shared timeout and pagination caps.
    pub fn live(config: &crate::config::Config) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(github::GithubProvider::new(config.provider_timeout)));
        registry.register(Arc::new(bluesky::BlueskyProvider::new(config.provider_timeout)));
        registry.register(Arc::new(youtube::YoutubeProvider::new(config.provider_timeout)));
        registry.register(Arc::new(devpad::DevpadProvider::new(config.provider_timeout)));
        registry.register(Arc::new(reddit::RedditProvider::new(
            config.provider_timeout,
            config.reddit_max_posts,
            config.reddit_max_comments,
        )));
        registry.register(Arc::new(twitter::TwitterProvider::new(config.provider_timeout)));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.platform(), provider);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers.get(&platform).cloned().ok_or_else(|| {
            ProviderError::UnknownPlatform { platform: platform.as_str().to_string() }
        })
    }
}

// ── Shared HTTP plumbing ─────────────────────────────────────────────────

/// Map a `reqwest` transport failure to the network tag.
pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        format!("Request timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("Request failed: {}", e)
    };
    ProviderError::Network { message }
}

/// Parse a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Default classification of a non-success status.
///
/// 429 is always a rate limit. 401/403 with an exhausted rate window is a
/// rate limit whose wait runs to the advertised reset; otherwise the
/// credential is treated as expired. Everything else is a plain API error.
pub(crate) fn classify_status(
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
    body: &str,
    now_unix: i64,
) -> ProviderError {
    let code = status.as_u16();
    if code == 429 {
        let retry_after_secs = parse_retry_after(headers)
            .or_else(|| reset_wait(headers, now_unix))
            .unwrap_or(60);
        return ProviderError::RateLimited { retry_after_secs };
    }

    if code == 401 || code == 403 {
        let rate = RateHeaders::from_headers(headers);
        if rate.remaining == Some(0) {
            let retry_after_secs = reset_wait(headers, now_unix).unwrap_or(60);
            return ProviderError::RateLimited { retry_after_secs };
        }
        return ProviderError::AuthExpired { message: truncate_body(body) };
    }

    ProviderError::Api { status: code, message: truncate_body(body) }
}

/// `max(0, reset - now)` when the reset header is present.
fn reset_wait(headers: &reqwest::header::HeaderMap, now_unix: i64) -> Option<u64> {
    RateHeaders::from_headers(headers)
        .reset_unix
        .map(|reset| reset.saturating_sub(now_unix).max(0) as u64)
}

fn truncate_body(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    const NOW: i64 = 1_700_000_000;

    fn headers(entries: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in entries {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn status_429_is_always_rate_limited() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "120")]),
            "slow down",
            NOW,
        );
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 120 });
    }

    #[test]
    fn forbidden_with_exhausted_window_is_rate_limited() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000090"),
            ]),
            "API rate limit exceeded",
            NOW,
        );
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 90 });
    }

    #[test]
    fn reset_in_the_past_clamps_to_zero() {
        let err = classify_status(
            StatusCode::FORBIDDEN,
            &headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1699999000"),
            ]),
            "",
            NOW,
        );
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 0 });
    }

    #[test]
    fn unauthorized_without_exhaustion_is_auth_expired() {
        let err = classify_status(
            StatusCode::UNAUTHORIZED,
            &headers(&[("x-ratelimit-remaining", "4999")]),
            "Bad credentials",
            NOW,
        );
        assert!(matches!(err, ProviderError::AuthExpired { message } if message == "Bad credentials"));
    }

    #[test]
    fn other_statuses_are_api_errors() {
        let err = classify_status(StatusCode::BAD_GATEWAY, &headers(&[]), "upstream down", NOW);
        assert_eq!(err, ProviderError::Api { status: 502, message: "upstream down".into() });
    }

    #[test]
    fn registry_reports_unknown_platform() {
        let registry = ProviderRegistry::new();
        let err = match registry.get(Platform::Devpad) {
            Err(e) => e,
            Ok(_) => panic!("expected unknown platform error"),
        };
        assert_eq!(err, ProviderError::UnknownPlatform { platform: "devpad".into() });
    }
}
