//! Cooperative shutdown signal.
//!
//! Every long-running loop in the workspace (stream session reader, ingestion
//! orchestrator, health scheduler) takes a [`Shutdown`] handle and checks it at
//! each suspension point so cancellation is cooperative rather than abrupt.
//! `SyncShutdown`/`AsyncShutdown` cover component-level shutdown; `Shutdown`/
//! `ShutdownHandle` add a broadcastable token for loop-level cancellation.

use std::future::Future;
use tokio::sync::watch;

/// Trait for components that can be shut down synchronously.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Trait for components that require asynchronous shutdown operations.
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// A broadcastable cancellation signal. Cloning a [`Shutdown`] hands out another
/// listener of the same underlying signal; calling [`ShutdownHandle::trigger`]
/// wakes every clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// The triggering half of a [`Shutdown`] signal. Held by whatever owns the
/// process lifecycle (typically `main`).
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Creates a linked [`ShutdownHandle`]/[`Shutdown`] pair.
pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    /// Signals every outstanding [`Shutdown`] listener to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Returns `true` once [`ShutdownHandle::trigger`] has been called.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`ShutdownHandle::trigger`] has been called. Safe to
    /// `select!` alongside other suspension points.
    pub async fn triggered(&mut self) {
        if self.is_triggered() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_all_listeners() {
        let (handle, mut a) = channel();
        let mut b = a.clone();

        assert!(!a.is_triggered());
        assert!(!b.is_triggered());

        handle.trigger();
        a.triggered().await;
        b.triggered().await;

        assert!(a.is_triggered());
        assert!(b.is_triggered());
    }
}
