//! Token-bucket admission with 429-driven exponential backoff.
//!
//! A fixed-window counter (`max_requests` per `window`) gates admission;
//! windows roll forward lazily the next time `acquire` notices the window has
//! elapsed, rather than on a background timer. Orthogonally, a backoff delay —
//! initialized to zero — blocks all pending and new acquires whenever the
//! venue has signalled a throttle via [`RateLimiter::report_throttled`]. FIFO
//! ordering among suspended callers is delegated to [`tokio::sync::Semaphore`],
//! which serves waiters in the order they called `acquire`.

use crate::error::SocketError;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Configuration for a single venue's [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// `N`: requests admitted per window.
    pub max_requests: u32,
    /// `W`: the fixed window duration.
    pub window: Duration,
    /// `baseDelay` in the backoff formula.
    pub base_retry_delay: Duration,
    /// Backoff ceiling (spec: 60s).
    pub max_retry_delay: Duration,
    /// Consecutive-throttle threshold after which `acquire` fails fast.
    pub max_retries: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(1),
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
}

#[derive(Debug)]
struct BackoffState {
    consecutive_throttles: u32,
    backoff_until: Option<Instant>,
}

/// Per-venue admission gate. Cheap to clone (internally `Arc`-shared); every
/// REST operation on a [`VenueAdapter`](../../xchange_exchange/adapter/trait.VenueAdapter.html)
/// acquires a token from the same limiter before issuing its call.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    sem: Arc<Semaphore>,
    window: Arc<Mutex<WindowState>>,
    backoff: Arc<Mutex<BackoffState>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(cfg.max_requests as usize)),
            window: Arc::new(Mutex::new(WindowState {
                window_start: Instant::now(),
            })),
            backoff: Arc::new(Mutex::new(BackoffState {
                consecutive_throttles: 0,
                backoff_until: None,
            })),
            cfg,
        }
    }

    /// Suspends the caller until admission is granted, or fails fast with
    /// [`SocketError::RateLimitExhausted`] once `max_retries` consecutive
    /// throttles have been recorded.
    pub async fn acquire(&self) -> Result<(), SocketError> {
        loop {
            let wait_for_backoff = {
                let g = self.backoff.lock();
                if g.consecutive_throttles >= self.cfg.max_retries {
                    return Err(SocketError::RateLimitExhausted(g.consecutive_throttles));
                }
                g.backoff_until.and_then(|until| {
                    let now = Instant::now();
                    (now < until).then(|| until - now)
                })
            };
            if let Some(wait) = wait_for_backoff {
                tokio::time::sleep(wait).await;
                continue;
            }

            self.roll_window_if_elapsed();

            let next_roll = {
                let g = self.window.lock();
                (g.window_start + self.cfg.window).saturating_duration_since(Instant::now())
            };

            match tokio::time::timeout(next_roll.max(Duration::from_millis(1)), self.sem.acquire())
                .await
            {
                Ok(Ok(permit)) => {
                    permit.forget();
                    return Ok(());
                }
                Ok(Err(_closed)) => unreachable!("RateLimiter semaphore is never closed"),
                Err(_elapsed) => continue,
            }
        }
    }

    fn roll_window_if_elapsed(&self) {
        let mut g = self.window.lock();
        let now = Instant::now();
        if now.saturating_duration_since(g.window_start) >= self.cfg.window {
            g.window_start = now;
            let available = self.sem.available_permits();
            let to_restore = (self.cfg.max_requests as usize).saturating_sub(available);
            if to_restore > 0 {
                self.sem.add_permits(to_restore);
            }
        }
    }

    /// Signals that the venue rejected a request with a rate-limit error.
    /// Computes `delay = min(baseDelay * 2^(k-1) + U(0, 500ms), 60s)` where
    /// `k` is the new consecutive-throttle count.
    pub fn report_throttled(&self) {
        let mut g = self.backoff.lock();
        g.consecutive_throttles += 1;
        let k = g.consecutive_throttles;
        let exp = self.cfg.base_retry_delay.saturating_mul(1u32 << (k.saturating_sub(1)).min(20));
        let jitter = Duration::from_millis(rand::rng().random_range(0..500));
        let delay = (exp + jitter).min(self.cfg.max_retry_delay);
        g.backoff_until = Some(Instant::now() + delay);
    }

    /// Signals any non-throttled completion, resetting the consecutive-throttle
    /// counter.
    pub fn report_success(&self) {
        let mut g = self.backoff.lock();
        g.consecutive_throttles = 0;
        g.backoff_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_max_requests_then_blocks_until_window_rolls() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 2,
            window: Duration::from_millis(200),
            base_retry_delay: Duration::from_millis(200),
            max_retry_delay: Duration::from_secs(1),
            max_retries: 5,
        });

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        // third exceeds the window's budget and must wait for the roll.
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn report_throttled_delays_subsequent_acquire() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 100,
            window: Duration::from_secs(10),
            base_retry_delay: Duration::from_millis(150),
            max_retry_delay: Duration::from_secs(1),
            max_retries: 5,
        });
        limiter.acquire().await.unwrap();
        limiter.report_throttled();

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn exhausting_max_retries_fails_fast() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 100,
            window: Duration::from_secs(10),
            base_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(5),
            max_retries: 3,
        });
        for _ in 0..3 {
            limiter.report_throttled();
        }
        let start = Instant::now();
        let result = limiter.acquire().await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn report_success_resets_backoff() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter.report_throttled();
        limiter.report_success();
        let g = limiter.backoff.lock();
        assert_eq!(g.consecutive_throttles, 0);
        assert!(g.backoff_until.is_none());
    }
}
