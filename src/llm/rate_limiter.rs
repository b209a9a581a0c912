// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Dual-bucket rate limiter for embedding and chat API calls.
//!
//! Tracks two sliding one-minute windows - request count and estimated token
//! count - plus a concurrency semaphore. `acquire` waits cooperatively when a
//! window is full, sleeping in chunks of at most five seconds and invoking the
//! caller's wait callback with the remaining seconds so progress trackers can
//! emit rate-limit heartbeats.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::EmbeddingError;

/// Observer notified while a caller waits for a window to clear.
///
/// Implementations forward rate-limit heartbeats to the progress tracker so
/// pollers can tell a waiting operation from a stuck one.
#[async_trait]
pub trait WaitObserver: Send + Sync {
    async fn on_wait(&self, remaining_seconds: f64);
}

/// Window length for both buckets.
const WINDOW: Duration = Duration::from_secs(60);

/// Longest single sleep while waiting for a window to clear.
const WAIT_CHUNK: Duration = Duration::from_secs(5);

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Estimated tokens admitted per minute.
    pub tokens_per_minute: u64,
    /// Requests admitted per minute.
    pub requests_per_minute: usize,
    /// Concurrent in-flight calls.
    pub max_concurrent: usize,
    /// Reject with `EmbeddingError::RateLimited` instead of waiting.
    pub reject_when_full: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: 200_000,
            requests_per_minute: 3000,
            max_concurrent: 2,
            reject_when_full: false,
        }
    }
}

#[derive(Debug, Default)]
struct Windows {
    request_times: VecDeque<Instant>,
    token_usage: VecDeque<(Instant, u64)>,
}

impl Windows {
    fn prune(&mut self, now: Instant) {
        while self
            .request_times
            .front()
            .is_some_and(|&t| now.duration_since(t) > WINDOW)
        {
            self.request_times.pop_front();
        }
        while self
            .token_usage
            .front()
            .is_some_and(|&(t, _)| now.duration_since(t) > WINDOW)
        {
            self.token_usage.pop_front();
        }
    }

    fn tokens_in_window(&self) -> u64 {
        self.token_usage.iter().map(|&(_, tokens)| tokens).sum()
    }

    fn admits(&self, estimated_tokens: u64, config: &RateLimitConfig) -> bool {
        if self.request_times.len() >= config.requests_per_minute {
            return false;
        }
        self.tokens_in_window() + estimated_tokens <= config.tokens_per_minute
    }

    /// Seconds until the oldest window entry expires.
    fn wait_time(&self, now: Instant) -> Duration {
        let oldest = match (self.request_times.front(), self.token_usage.front()) {
            (Some(&r), Some(&(t, _))) => r.min(t),
            (Some(&r), None) => r,
            (None, Some(&(t, _))) => t,
            (None, None) => return Duration::ZERO,
        };
        let age = now.duration_since(oldest);
        if age >= WINDOW {
            Duration::ZERO
        } else {
            WINDOW - age + Duration::from_millis(100)
        }
    }
}

/// Token- and request-aware admission controller.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
    semaphore: Arc<Semaphore>,
}

/// Holds the concurrency slot for the duration of the API call.
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            windows: Mutex::new(Windows::default()),
            semaphore,
        }
    }

    /// Acquire permission for a call estimated at `estimated_tokens`.
    ///
    /// Blocks until both windows admit the call. While waiting, the observer
    /// is notified once per sleep chunk with the remaining wait in seconds.
    /// Only when configured with `reject_when_full` does a full window
    /// produce an error instead of a wait.
    pub async fn acquire(
        &self,
        estimated_tokens: u64,
        observer: Option<&dyn WaitObserver>,
    ) -> Result<RatePermit, EmbeddingError> {
        loop {
            let wait = {
                let now = Instant::now();
                let mut windows = self.windows.lock().await;
                windows.prune(now);

                if windows.admits(estimated_tokens, &self.config) {
                    windows.request_times.push_back(now);
                    windows.token_usage.push_back((now, estimated_tokens));
                    break;
                }
                windows.wait_time(now)
            };

            if self.config.reject_when_full {
                return Err(EmbeddingError::RateLimited(format!(
                    "rate limiter full, retry in {:.1}s",
                    wait.as_secs_f64()
                )));
            }

            tracing::info!(
                "Rate limiting: waiting {:.1}s for {} tokens",
                wait.as_secs_f64(),
                estimated_tokens
            );

            let mut remaining = wait;
            while remaining > Duration::ZERO {
                let chunk = remaining.min(WAIT_CHUNK);
                tokio::time::sleep(chunk).await;
                remaining = remaining.saturating_sub(chunk);
                if let Some(observer) = observer {
                    observer.on_wait(remaining.as_secs_f64()).await;
                }
            }
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EmbeddingError::Api(format!("rate limiter closed: {}", e)))?;

        Ok(RatePermit { _permit: permit })
    }

    /// Current request and token counts in the window (for diagnostics).
    pub async fn current_usage(&self) -> (usize, u64) {
        let mut windows = self.windows.lock().await;
        windows.prune(Instant::now());
        (windows.request_times.len(), windows.tokens_in_window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig {
            tokens_per_minute: 1000,
            requests_per_minute: 3,
            max_concurrent: 2,
            reject_when_full: true,
        }
    }

    #[tokio::test]
    async fn test_admits_until_request_window_full() {
        let limiter = RateLimiter::new(tight_config());
        for _ in 0..3 {
            limiter.acquire(10, None).await.unwrap();
        }
        let err = limiter.acquire(10, None).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_token_window_rejects_oversize_total() {
        let limiter = RateLimiter::new(tight_config());
        limiter.acquire(900, None).await.unwrap();
        let err = limiter.acquire(200, None).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_usage_tracks_window_contents() {
        let limiter = RateLimiter::new(tight_config());
        limiter.acquire(100, None).await.unwrap();
        limiter.acquire(50, None).await.unwrap();
        let (requests, tokens) = limiter.current_usage().await;
        assert_eq!(requests, 2);
        assert_eq!(tokens, 150);
    }

    #[test]
    fn test_prune_drops_expired_entries() {
        let mut windows = Windows::default();
        let old = Instant::now() - Duration::from_secs(120);
        windows.request_times.push_back(old);
        windows.token_usage.push_back((old, 500));
        windows.prune(Instant::now());
        assert!(windows.request_times.is_empty());
        assert_eq!(windows.tokens_in_window(), 0);
    }
}
