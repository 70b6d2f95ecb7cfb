//! Retry backoff (spec §4.3): `delay = min(initialDelay * 2^(attempt-1) +
//! jitter, maxDelay)` with ±10% jitter, or a `fixed` mode. Jitter grounded
//! on `astrid_gateway::discord_proxy::backoff::Backoff`'s use of `fastrand`
//! for reconnect-delay jitter — same crate, same purpose.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::types::{BackoffType, RetryConfig};

pub struct RetryHandler;

impl RetryHandler {
    /// Compute the delay before `attempt` (1-indexed: the first retry after
    /// the initial failure is attempt 1).
    pub fn next_delay(config: &RetryConfig, attempt: u32) -> std::time::Duration {
        let base = match config.backoff_type {
            BackoffType::Fixed => config.initial_delay_ms,
            BackoffType::Exponential => {
                let exponent = attempt.saturating_sub(1);
                config
                    .initial_delay_ms
                    .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX))
            }
        };
        let capped = base.min(config.max_delay_ms);
        let jitter_span = (capped as f64 * 0.1).round() as i64;
        let jitter = if jitter_span == 0 { 0 } else { fastrand::i64(-jitter_span..=jitter_span) };
        let jittered = (capped as i64 + jitter).max(0) as u64;
        std::time::Duration::from_millis(jittered.min(config.max_delay_ms))
    }

    /// `next_delay` added to `from`, as an RFC 3339 timestamp for
    /// `next_retry_at`.
    pub fn next_retry_at(config: &RetryConfig, attempt: u32, from: DateTime<Utc>) -> String {
        let delay = Self::next_delay(config, attempt);
        (from + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero())).to_rfc3339()
    }

    pub fn exhausted(config: &RetryConfig, attempt: u32) -> bool {
        attempt >= config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1000,
            max_attempts: 3,
            backoff_type: BackoffType::Exponential,
            max_delay_ms: 60_000,
        }
    }

    #[test]
    fn exponential_delay_grows_and_stays_within_jitter_bounds() {
        let cfg = config();
        for attempt in 1..=3 {
            let expected_base = 1000u64 * 2u64.pow(attempt - 1);
            let delay = RetryHandler::next_delay(&cfg, attempt).as_millis() as f64;
            let lower = expected_base as f64 * 0.9;
            let upper = expected_base as f64 * 1.1;
            assert!(delay >= lower && delay <= upper, "attempt {attempt}: {delay} not within [{lower}, {upper}]");
        }
    }

    #[test]
    fn delay_never_exceeds_max() {
        let mut cfg = config();
        cfg.max_delay_ms = 3000;
        for attempt in 1..=10 {
            let delay = RetryHandler::next_delay(&cfg, attempt);
            assert!(delay <= std::time::Duration::from_millis(3000));
        }
    }

    #[test]
    fn fixed_backoff_does_not_grow() {
        let mut cfg = config();
        cfg.backoff_type = BackoffType::Fixed;
        for attempt in 1..=5 {
            let delay = RetryHandler::next_delay(&cfg, attempt).as_millis() as f64;
            assert!(delay >= 900.0 && delay <= 1100.0);
        }
    }

    #[test]
    fn max_attempts_marks_exhausted() {
        let cfg = config();
        assert!(!RetryHandler::exhausted(&cfg, 2));
        assert!(RetryHandler::exhausted(&cfg, 3));
    }
}
