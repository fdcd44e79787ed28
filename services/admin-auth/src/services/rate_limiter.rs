//! Sliding-window rate limiting for sign-in attempts.
//!
//! Each key (`email:<addr>` or `ip:<addr>`) keeps the instants of its recent
//! attempts. An attempt is allowed while fewer than `max_attempts` instants fall
//! inside the trailing window; allowed attempts are recorded, refused ones are not.
//! [`RateLimiter::allow_all`] admits an attempt against several keys at once and
//! records it on none of them unless every window has room.
//!
//! Features:
//! - Per-key windows with per-key locking
//! - Injected clock, so windows can be stepped in tests
//! - Idle key cleanup driven by the sweeper agent
//! - Allowed/denied counters for diagnostics

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default attempts per window
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length (seconds)
const DEFAULT_WINDOW_SECS: i64 = 15 * 60;

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Attempts allowed per key inside one window
    pub max_attempts: u32,
    /// Window length
    pub window: Duration,
    /// Whether rate limiting is enabled
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
            enabled: true,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set attempts per window
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set window length
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Enable or disable rate limiting
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Rate limiter statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    /// Total attempts allowed
    pub allowed_count: u64,
    /// Total attempts denied
    pub denied_count: u64,
    /// Number of tracked keys
    pub key_count: usize,
    /// Whether rate limiting is enabled
    pub enabled: bool,
}

/// Sliding-window limiter keyed by arbitrary strings.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    // Makes check-then-record atomic across keys.
    admission: Mutex<()>,
    allowed_count: AtomicU64,
    denied_count: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter with the given configuration and clock.
    #[must_use]
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: DashMap::new(),
            admission: Mutex::new(()),
            allowed_count: AtomicU64::new(0),
            denied_count: AtomicU64::new(0),
        }
    }

    /// Key for an email address.
    #[must_use]
    pub fn email_key(email: &str) -> String {
        format!("email:{email}")
    }

    /// Key for an origin address.
    #[must_use]
    pub fn ip_key(ip: &str) -> String {
        format!("ip:{ip}")
    }

    /// Record an attempt for `key` if the window has room.
    ///
    /// Never fails; returns `false` when the key is over its limit.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_all(&[key])
    }

    /// Record one attempt on every key, or on none of them.
    ///
    /// The attempt is admitted only if each key's window has room. A refused
    /// attempt leaves every window untouched.
    pub fn allow_all(&self, keys: &[&str]) -> bool {
        if !self.config.enabled {
            self.allowed_count.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let now = self.clock.now();
        let cutoff = now - self.config.window;
        let limit = usize::try_from(self.config.max_attempts).unwrap_or(usize::MAX);

        let admission = self.admission.lock();
        // At most one entry guard is held at a time; two guards on the same
        // shard would deadlock.
        let refused = keys.iter().copied().find(|key| {
            self.windows.get_mut(*key).is_some_and(|mut window| {
                while window.front().is_some_and(|at| *at <= cutoff) {
                    window.pop_front();
                }
                window.len() >= limit
            })
        });
        if refused.is_none() {
            for key in &keys {
                self.windows.entry((*key).to_string()).or_default().push_back(now);
            }
        }
        drop(admission);

        if let Some(key) = refused {
            self.denied_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(scope = "auth.rate_limit", key = %key, "attempt refused");
            false
        } else {
            self.allowed_count.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    /// Forget every attempt recorded for `key`.
    pub fn reset(&self, key: &str) {
        if self.windows.remove(key).is_some() {
            tracing::debug!(scope = "auth.rate_limit", key = %key, "reset rate limit window");
        }
    }

    /// Drop keys with no attempts inside the window. Returns how many were removed.
    pub fn purge_idle(&self) -> usize {
        let cutoff = self.clock.now() - self.config.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.back().is_some_and(|last| *last > cutoff));
        before.saturating_sub(self.windows.len())
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            allowed_count: self.allowed_count.load(Ordering::Relaxed),
            denied_count: self.denied_count.load(Ordering::Relaxed),
            key_count: self.windows.len(),
            enabled: self.config.enabled,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RateLimiter::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_rate_limiter_config_default() {
        let config = RateLimiterConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window, Duration::minutes(15));
    }

    #[test]
    fn test_rate_limiter_config_builder() {
        let config = RateLimiterConfig::new()
            .with_max_attempts(3)
            .with_window(Duration::seconds(30))
            .with_enabled(false);

        assert!(!config.enabled);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.window, Duration::seconds(30));
    }

    #[test]
    fn allows_up_to_threshold_then_refuses() {
        let (limiter, _clock) = limiter(RateLimiterConfig::default());

        for i in 0..5 {
            assert!(limiter.allow("email:a@x.com"), "attempt {i} should pass");
        }
        assert!(!limiter.allow("email:a@x.com"));

        let stats = limiter.stats();
        assert_eq!(stats.allowed_count, 5);
        assert_eq!(stats.denied_count, 1);
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter(RateLimiterConfig::new().with_max_attempts(1));

        assert!(limiter.allow("email:a@x.com"));
        assert!(!limiter.allow("email:a@x.com"));
        assert!(limiter.allow("email:b@x.com"));
        assert!(limiter.allow("ip:10.0.0.1"));
    }

    #[test]
    fn window_slides() {
        let (limiter, clock) = limiter(RateLimiterConfig::new().with_max_attempts(2));

        assert!(limiter.allow("k"));
        clock.advance(Duration::minutes(10));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // The first attempt leaves the window; the second still counts.
        clock.advance(Duration::minutes(5));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // Everything ages out after a full window.
        clock.advance(Duration::minutes(15));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let (limiter, _clock) = limiter(
            RateLimiterConfig::new()
                .with_max_attempts(1)
                .with_enabled(false),
        );
        for _ in 0..50 {
            assert!(limiter.allow("k"));
        }
        assert_eq!(limiter.stats().key_count, 0);
    }

    #[test]
    fn refused_combined_attempt_records_nothing() {
        let (limiter, _clock) = limiter(RateLimiterConfig::new().with_max_attempts(2));
        assert!(limiter.allow("ip:6.6.6.6"));
        assert!(limiter.allow("ip:6.6.6.6"));

        for _ in 0..5 {
            assert!(!limiter.allow_all(&["email:victim@x.com", "ip:6.6.6.6"]));
        }

        // The address window was never charged.
        assert!(limiter.allow_all(&["email:victim@x.com", "ip:1.2.3.4"]));
        assert!(limiter.allow_all(&["email:victim@x.com", "ip:1.2.3.4"]));
        assert!(!limiter.allow_all(&["email:victim@x.com", "ip:5.5.5.5"]));
    }

    #[test]
    fn combined_attempt_charges_every_key_once() {
        let (limiter, _clock) = limiter(RateLimiterConfig::new().with_max_attempts(1));
        assert!(limiter.allow_all(&["a", "b", "a"]));
        assert!(!limiter.allow("a"));
        assert!(!limiter.allow("b"));
        assert_eq!(limiter.stats().allowed_count, 1);
        assert_eq!(limiter.stats().denied_count, 2);
    }

    #[test]
    fn reset_clears_a_key() {
        let (limiter, _clock) = limiter(RateLimiterConfig::new().with_max_attempts(1));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        limiter.reset("k");
        assert!(limiter.allow("k"));
    }

    #[test]
    fn purge_idle_drops_stale_keys() {
        let (limiter, clock) = limiter(RateLimiterConfig::default());
        assert!(limiter.allow("old"));
        clock.advance(Duration::minutes(20));
        assert!(limiter.allow("fresh"));

        assert_eq!(limiter.purge_idle(), 1);
        assert_eq!(limiter.stats().key_count, 1);
    }

    #[test]
    fn key_helpers_namespace_values() {
        assert_eq!(RateLimiter::email_key("a@x.com"), "email:a@x.com");
        assert_eq!(RateLimiter::ip_key("10.0.0.1"), "ip:10.0.0.1");
    }
}
