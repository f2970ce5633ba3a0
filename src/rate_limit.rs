use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::models::Id;

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited. Counts the call.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Like `check` but counts nothing. Pair with `record` for actions that
    /// can still fail downstream and must not burn a slot on rejection.
    pub fn peek(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        entry.len() < limit
    }

    /// Counts one completed action against the key.
    pub fn record(&self, key: &str) {
        if !self.enabled { return; }
        self.store.entry(key.to_string()).or_default().push_back(Instant::now());
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub post_limit: usize,
    pub post_window: Duration,
    pub message_limit: usize,
    pub message_window: Duration,
    pub report_limit: usize,
    pub report_window: Duration,
    pub rating_limit: usize,
    pub rating_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            post_limit: usize_env("RL_POST_LIMIT", 5),
            post_window: dur_env("RL_POST_WINDOW", 300),
            message_limit: usize_env("RL_MESSAGE_LIMIT", 30),
            message_window: dur_env("RL_MESSAGE_WINDOW", 60),
            report_limit: usize_env("RL_REPORT_LIMIT", 10),
            report_window: dur_env("RL_REPORT_WINDOW", 3600),
            // rating an unbounded number of times would let one rater pump a
            // profile to the cap in seconds, so keep this one tight
            rating_limit: usize_env("RL_RATING_LIMIT", 1),
            rating_window: dur_env("RL_RATING_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers; keys combine action and caller id.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_post(&self, user: Id) -> bool { self.limiter.check(&format!("post:{user}"), self.cfg.post_limit, self.cfg.post_window) }
    pub fn allow_message(&self, user: Id) -> bool { self.limiter.check(&format!("message:{user}"), self.cfg.message_limit, self.cfg.message_window) }
    pub fn allow_report(&self, user: Id) -> bool { self.limiter.check(&format!("report:{user}"), self.cfg.report_limit, self.cfg.report_window) }

    fn rating_key(rater: Id, target: Id) -> String { format!("rating:{rater}:{target}") }

    /// Non-consuming check; only successful ratings are counted, via
    /// `record_rating`, so a rejected attempt keeps the slot open.
    pub fn rating_within_limit(&self, rater: Id, target: Id) -> bool {
        self.limiter.peek(&Self::rating_key(rater, target), self.cfg.rating_limit, self.cfg.rating_window)
    }

    pub fn record_rating(&self, rater: Id, target: Id) {
        self.limiter.record(&Self::rating_key(rater, target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..10 { assert!(rl.check("k", 1, Duration::from_secs(60))); }
    }

    #[test]
    fn rating_keys_are_pairwise() {
        let cfg = RateLimitConfig {
            post_limit: 1, post_window: Duration::from_secs(60),
            message_limit: 1, message_window: Duration::from_secs(60),
            report_limit: 1, report_window: Duration::from_secs(60),
            rating_limit: 1, rating_window: Duration::from_secs(60),
        };
        let facade = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(facade.rating_within_limit(1, 2));
        facade.record_rating(1, 2);
        assert!(!facade.rating_within_limit(1, 2));
        // a different target is a different window
        assert!(facade.rating_within_limit(1, 3));
    }

    #[test]
    fn peek_consumes_nothing_until_recorded() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_secs(60);
        // any number of rejected attempts leaves the slot open
        for _ in 0..5 { assert!(rl.peek("k", 1, window)); }
        rl.record("k");
        assert!(!rl.peek("k", 1, window));
    }
}
