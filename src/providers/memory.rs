//! Deterministic in-memory provider double.
//!
//! Satisfies the same `Provider` capability as the live adapters:
//! configurable payload, a call counter, and independently togglable failure
//! switches that short-circuit calls with the corresponding error.

use super::types::ProviderPayload;
use super::{FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MemoryProvider {
    platform: Platform,
    payload: Mutex<ProviderPayload>,
    rate: Mutex<RateHeaders>,
    call_count: AtomicUsize,
    simulate_rate_limit: Mutex<Option<u64>>,
    simulate_auth_expired: AtomicBool,
}

impl MemoryProvider {
    pub fn new(platform: Platform, payload: ProviderPayload) -> Self {
        Self {
            platform,
            payload: Mutex::new(payload),
            rate: Mutex::new(RateHeaders::default()),
            call_count: AtomicUsize::new(0),
            simulate_rate_limit: Mutex::new(None),
            simulate_auth_expired: AtomicBool::new(false),
        }
    }

    /// Replace the payload returned by subsequent calls.
    pub fn set_payload(&self, payload: ProviderPayload) {
        *self.payload.lock().unwrap() = payload;
    }

    /// Rate headers reported alongside successful fetches.
    pub fn set_rate_headers(&self, rate: RateHeaders) {
        *self.rate.lock().unwrap() = rate;
    }

    /// Fetches observed so far, including short-circuited ones.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// While set, calls fail with `RateLimited { retry_after_secs }`.
    pub fn set_simulate_rate_limit(&self, retry_after_secs: Option<u64>) {
        *self.simulate_rate_limit.lock().unwrap() = retry_after_secs;
    }

    /// While set, calls fail with `AuthExpired`.
    pub fn set_simulate_auth_expired(&self, on: bool) {
        self.simulate_auth_expired.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, _token: &str) -> Result<FetchResult, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(retry_after_secs) = *self.simulate_rate_limit.lock().unwrap() {
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if self.simulate_auth_expired.load(Ordering::SeqCst) {
            return Err(ProviderError::AuthExpired { message: "simulated expiry".into() });
        }

        Ok(FetchResult {
            payload: self.payload.lock().unwrap().clone(),
            rate: *self.rate.lock().unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::{DevpadRaw, ProviderPayload};

    fn double() -> MemoryProvider {
        MemoryProvider::new(
            Platform::Devpad,
            ProviderPayload::Devpad(DevpadRaw::default()),
        )
    }

    #[tokio::test]
    async fn counts_every_call() {
        let provider = double();
        provider.fetch("t").await.unwrap();
        provider.set_simulate_auth_expired(true);
        let _ = provider.fetch("t").await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn rate_limit_switch_short_circuits() {
        let provider = double();
        provider.set_simulate_rate_limit(Some(120));
        let err = provider.fetch("t").await.unwrap_err();
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 120 });

        provider.set_simulate_rate_limit(None);
        assert!(provider.fetch("t").await.is_ok());
    }

    #[tokio::test]
    async fn auth_switch_short_circuits_independently() {
        let provider = double();
        provider.set_simulate_auth_expired(true);
        assert!(matches!(
            provider.fetch("t").await.unwrap_err(),
            ProviderError::AuthExpired { .. }
        ));

        provider.set_simulate_auth_expired(false);
        assert!(provider.fetch("t").await.is_ok());
    }

    #[tokio::test]
    async fn reports_configured_rate_headers() {
        let provider = double();
        provider.set_rate_headers(RateHeaders {
            remaining: Some(10),
            limit: Some(60),
            reset_unix: Some(1_700_000_000),
        });
        let result = provider.fetch("t").await.unwrap();
        assert_eq!(result.rate.remaining, Some(10));
    }
}
