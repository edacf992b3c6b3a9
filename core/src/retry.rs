//! Retry scheduling for failed attempts.
//!
//! # Design
//! Eligibility is decided per call: only `read` is retried unless the client
//! or the request opts into unsafe retries. Within an eligible call an
//! attempt is retried while fewer than `max_retries` retries have run, the
//! failure is not an abort, and it is either a timeout or a response whose
//! status is in the retryable set (`0` and `408` by default).
//!
//! Retry `n` waits up to `2^(n-1) * interval`. `Jitter::Full` draws the wait
//! uniformly below that ceiling; `Jitter::None` waits the full ceiling.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::{ErrorReason, FetchError};
use crate::types::Operation;

/// How the exponential delay is randomised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Uniform in `[0, 2^(n-1) * interval)`.
    #[default]
    Full,
    /// Exactly `2^(n-1) * interval`.
    None,
}

/// Which failed attempts are retried and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    interval: Duration,
    retryable_status_codes: BTreeSet<u16>,
    jitter: Jitter,
}

impl RetryPolicy {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn configured_max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether the zero-indexed `attempt` that just failed with `error`
    /// should be followed by another one.
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error.reason {
            ErrorReason::Abort => false,
            ErrorReason::Timeout => true,
            _ => self.retryable_status_codes.contains(&error.status_code),
        }
    }

    /// Delay before retry number `retry_index` (the first retry is 1).
    pub fn delay(&self, retry_index: u32) -> Duration {
        let upper = self.backoff_ceiling(retry_index);
        match self.jitter {
            Jitter::None => upper,
            // Scaling through f64 can round past `Duration::MAX` for huge
            // ceilings; clamp instead of panicking.
            Jitter::Full => Duration::try_from_secs_f64(upper.as_secs_f64() * rand::rng().random::<f64>())
                .map_or(upper, |delay| delay.min(upper)),
        }
    }

    pub(crate) fn backoff_ceiling(&self, retry_index: u32) -> Duration {
        let exponent = retry_index.saturating_sub(1).min(31);
        self.interval.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            interval: Duration::from_millis(200),
            retryable_status_codes: default_retryable_status_codes(),
            jitter: Jitter::Full,
        }
    }
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [0_u16, 408].into_iter().collect()
}

/// Serializable form of `RetryPolicy`; omitted fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub interval_ms: Option<u64>,
    pub retryable_status_codes: Option<Vec<u16>>,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        let mut policy = RetryPolicy::default();
        if let Some(max_retries) = config.max_retries {
            policy = policy.max_retries(max_retries);
        }
        if let Some(interval_ms) = config.interval_ms {
            policy = policy.interval(Duration::from_millis(interval_ms));
        }
        if let Some(codes) = config.retryable_status_codes {
            policy = policy.retryable_status_codes(codes);
        }
        policy
    }
}

/// Only reads are retried unless unsafe retries were explicitly allowed.
pub fn retry_eligible(operation: Operation, allow_unsafe_retry: bool) -> bool {
    operation == Operation::Read || allow_unsafe_retry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(reason: ErrorReason, status_code: u16) -> FetchError {
        FetchError {
            reason,
            status_code,
            message: String::new(),
            output: None,
            meta: None,
            timeout: Duration::from_millis(3000),
            url: "/api/widgets".to_string(),
            raw_request: None,
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.configured_max_retries(), 2);
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(200));
        assert!(policy.retryable_status_codes.contains(&0));
        assert!(policy.retryable_status_codes.contains(&408));
    }

    #[test]
    fn full_jitter_stays_within_exponential_ceiling() {
        let policy = RetryPolicy::default().interval(Duration::from_millis(100));
        for retry_index in 1..=4 {
            let ceiling = Duration::from_millis(100 * (1 << (retry_index - 1)));
            for _ in 0..256 {
                assert!(policy.delay(retry_index) <= ceiling);
            }
        }
    }

    #[test]
    fn huge_interval_saturates_without_panicking() {
        let policy = RetryPolicy::default().interval(Duration::MAX);
        assert_eq!(policy.backoff_ceiling(8), Duration::MAX);
        for _ in 0..256 {
            assert!(policy.delay(8) <= Duration::MAX);
        }
        assert_eq!(policy.jitter(Jitter::None).delay(8), Duration::MAX);
    }

    #[test]
    fn no_jitter_uses_ceiling() {
        let policy = RetryPolicy::default().jitter(Jitter::None);
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn timeout_and_listed_statuses_are_retryable() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, &failure(ErrorReason::Timeout, 0)));
        assert!(policy.should_retry(0, &failure(ErrorReason::Unknown, 0)));
        assert!(policy.should_retry(1, &failure(ErrorReason::BadHttpStatus, 408)));
        assert!(!policy.should_retry(0, &failure(ErrorReason::BadHttpStatus, 500)));
        assert!(!policy.should_retry(0, &failure(ErrorReason::Abort, 0)));
    }

    #[test]
    fn stops_after_max_retries() {
        let policy = RetryPolicy::default().max_retries(2);
        let err = failure(ErrorReason::Timeout, 0);
        assert!(policy.should_retry(1, &err));
        assert!(!policy.should_retry(2, &err));
    }

    #[test]
    fn only_reads_are_eligible_by_default() {
        assert!(retry_eligible(Operation::Read, false));
        assert!(!retry_eligible(Operation::Create, false));
        assert!(!retry_eligible(Operation::Delete, false));
        assert!(retry_eligible(Operation::Update, true));
    }

    #[test]
    fn config_overrides_only_given_fields() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_retries":5}"#).unwrap();
        let policy = RetryPolicy::from(config);
        assert_eq!(policy.configured_max_retries(), 5);
        assert_eq!(policy.interval, Duration::from_millis(200));
    }
}
