use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
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
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Post,
    Comment,
    Report,
    Avatar,
}

impl Action {
    fn prefix(self) -> &'static str {
        match self {
            Action::Post => "post",
            Action::Comment => "comment",
            Action::Report => "report",
            Action::Avatar => "avatar",
        }
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub post_limit: usize,
    pub post_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub report_limit: usize,
    pub report_window: Duration,
    pub avatar_limit: usize,
    pub avatar_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            post_limit: usize_env("RL_POST_LIMIT", 5),
            post_window: dur_env("RL_POST_WINDOW", 300),
            comment_limit: usize_env("RL_COMMENT_LIMIT", 20),
            comment_window: dur_env("RL_COMMENT_WINDOW", 60),
            report_limit: usize_env("RL_REPORT_LIMIT", 10),
            report_window: dur_env("RL_REPORT_WINDOW", 3600),
            avatar_limit: usize_env("RL_AVATAR_LIMIT", 5),
            avatar_window: dur_env("RL_AVATAR_WINDOW", 3600),
        }
    }

    fn limit_for(&self, action: Action) -> (usize, Duration) {
        match action {
            Action::Post => (self.post_limit, self.post_window),
            Action::Comment => (self.comment_limit, self.comment_window),
            Action::Report => (self.report_limit, self.report_window),
            Action::Avatar => (self.avatar_limit, self.avatar_window),
        }
    }
}

/// High level guard used by handlers, keyed by user id.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn from_env() -> Self {
        let enabled = std::env::var("RATE_LIMIT_ENABLED").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(true);
        Self::new(InMemoryRateLimiter::new(enabled), RateLimitConfig::from_env())
    }

    pub fn allow(&self, action: Action, user_id: &str) -> bool {
        let (limit, window) = self.cfg.limit_for(action);
        self.limiter.check(&format!("{}:{user_id}", action.prefix()), limit, window)
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
        std::thread::sleep(Duration::from_millis(60));
        assert!(rl.check("k", 3, window));
    }

    #[test]
    fn actions_are_counted_separately() {
        let cfg = RateLimitConfig {
            post_limit: 1, post_window: Duration::from_secs(60),
            comment_limit: 1, comment_window: Duration::from_secs(60),
            report_limit: 1, report_window: Duration::from_secs(60),
            avatar_limit: 1, avatar_window: Duration::from_secs(60),
        };
        let f = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(f.allow(Action::Post, "u"));
        assert!(!f.allow(Action::Post, "u"));
        assert!(f.allow(Action::Comment, "u"));
        assert!(f.allow(Action::Post, "other"));
    }
}
