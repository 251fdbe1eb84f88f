//! Per-provider call limiter.
//!
//! A [`RateLimiter`] is owned by whoever builds the provider and handed to it
//! explicitly, so independent pipelines never share hidden call counters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

fn default_calls_per_minute() -> u32 {
    30
}

fn default_min_interval_ms() -> u64 {
    1000
}

/// Limits applied before every outbound call. Zero disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            calls_per_minute: 0,
            min_interval_ms: 0,
        }
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    calls: u32,
    last_call: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window {
                started: Instant::now(),
                calls: 0,
                last_call: None,
            }),
        }
    }

    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(RateLimitConfig::unlimited())
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Wait until one more call is allowed, then record it.
    ///
    /// The window lock is held while waiting so concurrent callers are released
    /// one at a time and the spacing guarantee holds across tasks.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        let now = Instant::now();
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.calls = 0;
        }

        if self.config.calls_per_minute > 0 && window.calls >= self.config.calls_per_minute {
            let wait = WINDOW.saturating_sub(now.duration_since(window.started));
            tracing::info!(
                wait_secs = wait.as_secs_f32(),
                limit = self.config.calls_per_minute,
                "rate limit reached, waiting for next window"
            );
            tokio::time::sleep(wait).await;
            window.started = Instant::now();
            window.calls = 0;
        }

        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        if let Some(last) = window.last_call {
            let since = Instant::now().duration_since(last);
            if since < min_interval {
                tokio::time::sleep(min_interval - since).await;
            }
        }

        window.last_call = Some(Instant::now());
        window.calls += 1;
    }

    /// Calls recorded in the current one-minute window.
    pub async fn calls_in_window(&self) -> u32 {
        self.window.lock().await.calls
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_provider_quota() {
        let cfg = RateLimitConfig::default();
        assert_eq!(cfg.calls_per_minute, 30);
        assert_eq!(cfg.min_interval_ms, 1000);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: RateLimitConfig = serde_json::from_str(r#"{"calls_per_minute": 5}"#).unwrap();
        assert_eq!(cfg.calls_per_minute, 5);
        assert_eq!(cfg.min_interval_ms, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.calls_in_window().await, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_min_interval() {
        let limiter = RateLimiter::new(RateLimitConfig {
            calls_per_minute: 0,
            min_interval_ms: 500,
        });
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_next_window_when_quota_exhausted() {
        let limiter = RateLimiter::new(RateLimitConfig {
            calls_per_minute: 2,
            min_interval_ms: 0,
        });
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= WINDOW);
        assert_eq!(limiter.calls_in_window().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_a_minute() {
        let limiter = RateLimiter::new(RateLimitConfig {
            calls_per_minute: 1,
            min_interval_ms: 0,
        });
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
