//! Per-account rate-limit accounting and circuit breaking.
//!
//! Each account carries a [`RateState`] row combining the most recently
//! observed rate-limit headers with a consecutive-failure counter. The
//! [`RatePolicy`] decides fetchability: an exhausted rate window suppresses
//! fetching regardless of circuit state, and an open circuit suppresses
//! fetching regardless of rate counters.
//!
//! Adapters never touch this state; the scheduler records success/failure
//! after inspecting the provider result.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate-limit observations for a single account. Null fields mean
/// "unknown / never observed" and permit fetching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateState {
    pub remaining: Option<i64>,
    pub limit_total: Option<i64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub circuit_open_until: Option<DateTime<Utc>>,
}

impl RateState {
    /// Whether the circuit is open at `now`.
    pub fn circuit_open(&self, now: DateTime<Utc>) -> bool {
        self.circuit_open_until.map(|until| now < until).unwrap_or(false)
    }

    /// Whether the rate window is exhausted at `now`.
    pub fn rate_exhausted(&self, now: DateTime<Utc>) -> bool {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset)) => now < reset,
            _ => false,
        }
    }
}

/// Rate-limit counters extracted from conventional response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateHeaders {
    pub remaining: Option<i64>,
    pub limit: Option<i64>,
    /// `X-RateLimit-Reset` as unix seconds.
    pub reset_unix: Option<i64>,
}

impl RateHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        }

        Self {
            remaining: header_i64(headers, "x-ratelimit-remaining"),
            limit: header_i64(headers, "x-ratelimit-limit"),
            reset_unix: header_i64(headers, "x-ratelimit-reset"),
        }
    }

    fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_unix.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Policy knobs: how many consecutive failures open the circuit and for how
/// long it stays open.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub threshold: u32,
    pub cooldown: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl RatePolicy {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self { threshold, cooldown }
    }

    /// Whether the account may be fetched at `now`.
    pub fn should_fetch(&self, state: &RateState, now: DateTime<Utc>) -> bool {
        !state.circuit_open(now) && !state.rate_exhausted(now)
    }

    /// Record a successful fetch: adopt observed counters and close the
    /// circuit.
    pub fn update_on_success(&self, state: &mut RateState, headers: &RateHeaders) {
        if headers.remaining.is_some() {
            state.remaining = headers.remaining;
        }
        if headers.limit.is_some() {
            state.limit_total = headers.limit;
        }
        if let Some(reset) = headers.reset_at() {
            state.reset_at = Some(reset);
        }
        state.consecutive_failures = 0;
        state.last_failure_at = None;
        state.circuit_open_until = None;
    }

    /// Record a failed fetch. A provider-supplied `retry_after` marks the
    /// rate window exhausted until then; otherwise previously observed
    /// counters are preserved.
    pub fn update_on_failure(
        &self,
        state: &mut RateState,
        retry_after: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);

        if state.consecutive_failures >= self.threshold {
            let cooldown = ChronoDuration::from_std(self.cooldown)
                .unwrap_or_else(|_| ChronoDuration::seconds(300));
            state.circuit_open_until = Some(now + cooldown);
            tracing::warn!(
                consecutive_failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened after repeated failures"
            );
        }

        if let Some(retry_after) = retry_after {
            let wait = ChronoDuration::from_std(retry_after)
                .unwrap_or_else(|_| ChronoDuration::seconds(retry_after.as_secs() as i64));
            state.remaining = Some(0);
            state.reset_at = Some(now + wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn unknown_state_permits_fetching() {
        let policy = RatePolicy::default();
        assert!(policy.should_fetch(&RateState::default(), at(0)));
    }

    #[test]
    fn exhausted_rate_window_gates() {
        let policy = RatePolicy::default();
        let state = RateState {
            remaining: Some(0),
            reset_at: Some(at(300)),
            ..Default::default()
        };
        assert!(!policy.should_fetch(&state, at(0)));
        // Window expired: permitted again.
        assert!(policy.should_fetch(&state, at(301)));
    }

    #[test]
    fn zero_remaining_without_reset_does_not_gate() {
        let policy = RatePolicy::default();
        let state = RateState {
            remaining: Some(0),
            ..Default::default()
        };
        assert!(policy.should_fetch(&state, at(0)));
    }

    #[test]
    fn open_circuit_gates_regardless_of_counters() {
        let policy = RatePolicy::default();
        let state = RateState {
            remaining: Some(5000),
            circuit_open_until: Some(at(120)),
            ..Default::default()
        };
        assert!(!policy.should_fetch(&state, at(0)));
        assert!(policy.should_fetch(&state, at(121)));
    }

    #[test]
    fn exhausted_window_gates_even_with_closed_circuit() {
        // Precedence: either condition alone suppresses fetching.
        let policy = RatePolicy::default();
        let state = RateState {
            remaining: Some(0),
            reset_at: Some(at(600)),
            circuit_open_until: Some(at(10)),
            ..Default::default()
        };
        // Circuit expired at 10, rate window persists through 600.
        assert!(!policy.should_fetch(&state, at(60)));
    }

    #[test]
    fn success_adopts_headers_and_closes_circuit() {
        let policy = RatePolicy::default();
        let mut state = RateState {
            consecutive_failures: 4,
            last_failure_at: Some(at(0)),
            circuit_open_until: Some(at(300)),
            ..Default::default()
        };

        let headers = RateHeaders {
            remaining: Some(4999),
            limit: Some(5000),
            reset_unix: Some(1_700_000_000 + 3600),
        };
        policy.update_on_success(&mut state, &headers);

        assert_eq!(state.remaining, Some(4999));
        assert_eq!(state.limit_total, Some(5000));
        assert_eq!(state.reset_at, Some(at(3600)));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_failure_at, None);
        assert_eq!(state.circuit_open_until, None);
    }

    #[test]
    fn success_with_missing_headers_preserves_counters() {
        let policy = RatePolicy::default();
        let mut state = RateState {
            remaining: Some(10),
            limit_total: Some(60),
            reset_at: Some(at(100)),
            ..Default::default()
        };
        policy.update_on_success(&mut state, &RateHeaders::default());
        assert_eq!(state.remaining, Some(10));
        assert_eq!(state.limit_total, Some(60));
        assert_eq!(state.reset_at, Some(at(100)));
    }

    #[test]
    fn failure_below_threshold_keeps_circuit_closed() {
        let policy = RatePolicy::default();
        let mut state = RateState::default();

        policy.update_on_failure(&mut state, None, at(0));
        policy.update_on_failure(&mut state, None, at(1));

        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_failure_at, Some(at(1)));
        assert_eq!(state.circuit_open_until, None);
    }

    #[test]
    fn failure_at_threshold_opens_circuit() {
        let policy = RatePolicy::default();
        let mut state = RateState {
            consecutive_failures: 2,
            ..Default::default()
        };

        policy.update_on_failure(&mut state, None, at(0));

        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.circuit_open_until, Some(at(300)));
    }

    #[test]
    fn retry_after_exhausts_rate_window() {
        let policy = RatePolicy::default();
        let mut state = RateState {
            remaining: Some(42),
            limit_total: Some(100),
            ..Default::default()
        };

        policy.update_on_failure(&mut state, Some(Duration::from_secs(90)), at(0));

        assert_eq!(state.remaining, Some(0));
        assert_eq!(state.reset_at, Some(at(90)));
        // Other observed counters survive.
        assert_eq!(state.limit_total, Some(100));
        assert!(!policy.should_fetch(&state, at(30)));
    }

    #[test]
    fn failure_without_retry_after_preserves_counters() {
        let policy = RatePolicy::default();
        let mut state = RateState {
            remaining: Some(42),
            reset_at: Some(at(500)),
            ..Default::default()
        };
        policy.update_on_failure(&mut state, None, at(0));
        assert_eq!(state.remaining, Some(42));
        assert_eq!(state.reset_at, Some(at(500)));
    }

    #[test]
    fn headers_parse_from_header_map() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "0".parse().unwrap());
        headers.insert("X-RateLimit-Limit", "5000".parse().unwrap());
        headers.insert("X-RateLimit-Reset", "1700003600".parse().unwrap());

        let parsed = RateHeaders::from_headers(&headers);
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.limit, Some(5000));
        assert_eq!(parsed.reset_unix, Some(1_700_003_600));
    }

    #[test]
    fn malformed_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "soon".parse().unwrap());
        let parsed = RateHeaders::from_headers(&headers);
        assert_eq!(parsed.remaining, None);
    }
}
