//! Fixed-window rate limiter keyed by client IP (spec §5/§7: "the rate-limit
//! store maps client identifier -> `{count, resetAt}` with a background
//! sweeper reclaiming expired entries once per minute"), grounded on the
//! registry's `DashMap`-of-state idiom rather than a crate dependency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Window {
    count: u32,
    reset_at: Instant,
}

/// One limiter instance per policy (auth endpoints vs. general API); each
/// wraps its own independent counter map.
#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    buckets: Arc<DashMap<String, Window>>,
}

pub struct Decision {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, buckets: Arc::new(DashMap::new()) }
    }

    pub fn auth() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    pub fn general() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// Check and increment the counter for `client_id` (typically a remote
    /// IP). Non-blocking; expired windows reset on first touch rather than
    /// waiting for the sweeper.
    pub fn check(&self, client_id: &str) -> Decision {
        let now = Instant::now();
        let mut entry = self.buckets.entry(client_id.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }
        entry.count += 1;
        if entry.count > self.limit {
            let retry_after_secs = entry.reset_at.saturating_duration_since(now).as_secs().max(1);
            Decision { allowed: false, retry_after_secs }
        } else {
            Decision { allowed: true, retry_after_secs: 0 }
        }
    }

    /// Background task reclaiming expired entries once a minute (spec §5).
    /// Spawned once at startup and runs for the process lifetime.
    pub async fn run_sweeper(self) {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let now = Instant::now();
            self.buckets.retain(|_, w| w.reset_at > now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").allowed);
        }
        let decision = limiter.check("1.2.3.4");
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs >= 1);
    }

    #[test]
    fn different_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("a").allowed);
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("a").allowed);
    }
}
