//! Per-destination retry policy.
//!
//! Backoff is deterministic for a given `(attempt, policy)` pair: the
//! schedule must be reproducible from the persisted retry count alone, so
//! there is no jitter.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Exponential backoff parameters governing retries for a destination.
///
/// `backoff(n) = min(initial_backoff_ms * multiplier^n, max_backoff_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: i32,

    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Exponential growth factor.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 300_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `n + 1` (zero-based exponent).
    #[must_use]
    pub fn backoff(&self, n: i32) -> Duration {
        let exp = self.multiplier.powi(n.max(0));
        let delay_ms = (self.initial_backoff_ms as f64 * exp).min(self.max_backoff_ms as f64);
        Duration::milliseconds(delay_ms as i64)
    }

    /// Whether a delivery with `retry_count` retries already spent may not
    /// be retried again.
    #[must_use]
    pub fn is_exhausted(&self, retry_count: i32) -> bool {
        retry_count >= self.max_retries
    }

    /// Parse a destination's `retry_policy` JSONB column, falling back to
    /// the defaults for anything unparseable.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Serialize for the `retry_policy` JSONB column.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff_ms, 1_000);
        assert_eq!(policy.max_backoff_ms, 300_000);
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::milliseconds(1_000));
        assert_eq!(policy.backoff(1), Duration::milliseconds(2_000));
        assert_eq!(policy.backoff(2), Duration::milliseconds(4_000));
        assert_eq!(policy.backoff(3), Duration::milliseconds(8_000));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let policy = RetryPolicy::default();
        // 1000 * 2^20 far exceeds the 300s cap.
        assert_eq!(policy.backoff(20), Duration::milliseconds(300_000));
    }

    #[test]
    fn test_backoff_is_monotonic_and_bounded() {
        let policy = RetryPolicy::default();
        for n in 0..30 {
            assert!(policy.backoff(n) <= policy.backoff(n + 1));
            assert!(policy.backoff(n) <= Duration::milliseconds(policy.max_backoff_ms as i64));
        }
    }

    #[test]
    fn test_backoff_is_deterministic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(4), policy.backoff(4));
    }

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn test_zero_max_retries_exhausts_immediately() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert!(policy.is_exhausted(0));
    }

    #[test]
    fn test_from_value_falls_back_to_defaults() {
        assert_eq!(
            RetryPolicy::from_value(&serde_json::json!({})),
            RetryPolicy::default()
        );
        assert_eq!(
            RetryPolicy::from_value(&serde_json::json!("garbage")),
            RetryPolicy::default()
        );
    }

    #[test]
    fn test_value_roundtrip() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 3.0,
        };
        assert_eq!(RetryPolicy::from_value(&policy.to_value()), policy);
    }

    #[test]
    fn test_partial_value_fills_remaining_defaults() {
        let policy = RetryPolicy::from_value(&serde_json::json!({ "max_retries": 1 }));
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.initial_backoff_ms, 1_000);
    }
}
