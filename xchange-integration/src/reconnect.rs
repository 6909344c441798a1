//! Exponential-backoff-with-jitter reconnect loop.
//!
//! Wraps a connect operation; on observed disconnect the caller drives
//! [`ReconnectController::run`], which retries with
//! `delay = min(base * 2^(k-1), cap) + U(0, 1s)`, resetting `k` on success.
//! The subscription-replay hook runs exactly once per successful reconnect,
//! before control returns to the caller, so the stream session never hands
//! back a connection with unresolved subscriptions.

use crate::error::SocketError;
use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;

/// Lifecycle events emitted while reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectEvent {
    Reconnecting { attempt: u32 },
    Reconnected,
    Terminal,
}

/// Backoff parameters for [`ReconnectController`].
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Establishes a fresh session `S`. Implemented per venue adapter (opens the
/// socket, runs the auth handshake if private).
pub trait Connect<S>: Send + Sync {
    fn connect<'a>(&'a self) -> BoxFuture<'a, Result<S, SocketError>>;
}

/// Re-emits every previously successful subscription against a freshly
/// connected session. Implemented by the stream session itself, which tracks
/// subscriptions by their uniqueness key.
pub trait ReplaySubscriptions<S>: Send + Sync {
    fn replay<'a>(&'a self, session: &'a mut S) -> BoxFuture<'a, Result<(), SocketError>>;
}

/// Drives the exponential-backoff reconnect loop.
pub struct ReconnectController<S> {
    cfg: ReconnectConfig,
    connector: Box<dyn Connect<S> + Send + Sync>,
    replay: Box<dyn ReplaySubscriptions<S> + Send + Sync>,
}

impl<S> ReconnectController<S> {
    pub fn new(
        cfg: ReconnectConfig,
        connector: impl Connect<S> + Send + Sync + 'static,
        replay: impl ReplaySubscriptions<S> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cfg,
            connector: Box::new(connector),
            replay: Box::new(replay),
        }
    }

    /// Runs the reconnect loop to completion: connects, replays subscriptions,
    /// and returns the new session, or a terminal error after `max_attempts`.
    pub async fn run(
        &self,
        mut on_event: impl FnMut(ReconnectEvent),
    ) -> Result<S, SocketError> {
        let mut attempt: u32 = 0;
        loop {
            match self.connector.connect().await {
                Ok(mut session) => {
                    self.replay.replay(&mut session).await?;
                    on_event(ReconnectEvent::Reconnected);
                    return Ok(session);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > self.cfg.max_attempts {
                        on_event(ReconnectEvent::Terminal);
                        return Err(err);
                    }
                    on_event(ReconnectEvent::Reconnecting { attempt });
                    tokio::time::sleep(backoff_delay(&self.cfg, attempt)).await;
                }
            }
        }
    }
}

/// `delay_k = min(base * 2^(k-1), cap) + U(0, 1s)`.
fn backoff_delay(cfg: &ReconnectConfig, attempt: u32) -> Duration {
    let exp = cfg
        .base_delay
        .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(20));
    let capped = exp.min(cfg.max_delay);
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    capped + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    struct FlakyConnector {
        fails_remaining: AtomicU32,
    }

    impl Connect<u32> for FlakyConnector {
        fn connect<'a>(&'a self) -> BoxFuture<'a, Result<u32, SocketError>> {
            Box::pin(async move {
                if self.fails_remaining.load(Ordering::SeqCst) > 0 {
                    self.fails_remaining.fetch_sub(1, Ordering::SeqCst);
                    Err(SocketError::ConnectFailed("simulated".into()))
                } else {
                    Ok(42)
                }
            })
        }
    }

    struct CountingReplay {
        calls: Arc<AtomicU32>,
    }

    impl ReplaySubscriptions<u32> for CountingReplay {
        fn replay<'a>(&'a self, _session: &'a mut u32) -> BoxFuture<'a, Result<(), SocketError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn reconnects_and_replays_exactly_once() {
        let replay_calls = Arc::new(AtomicU32::new(0));
        let controller = ReconnectController::new(
            ReconnectConfig {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                max_attempts: 5,
            },
            FlakyConnector {
                fails_remaining: AtomicU32::new(2),
            },
            CountingReplay {
                calls: replay_calls.clone(),
            },
        );

        let mut events = Vec::new();
        let start = Instant::now();
        let session = controller.run(|e| events.push(e)).await.unwrap();

        assert_eq!(session, 42);
        assert_eq!(replay_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events,
            vec![
                ReconnectEvent::Reconnecting { attempt: 1 },
                ReconnectEvent::Reconnecting { attempt: 2 },
                ReconnectEvent::Reconnected,
            ]
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn terminal_error_after_max_attempts() {
        let controller = ReconnectController::new(
            ReconnectConfig {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                max_attempts: 2,
            },
            FlakyConnector {
                fails_remaining: AtomicU32::new(10),
            },
            CountingReplay {
                calls: Arc::new(AtomicU32::new(0)),
            },
        );

        let mut events = Vec::new();
        let result = controller.run(|e| events.push(e)).await;
        assert!(result.is_err());
        assert_eq!(*events.last().unwrap(), ReconnectEvent::Terminal);
    }
}
