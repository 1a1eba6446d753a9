//! Cooperative cancellation for a mirror run

use std::future::Future;
use tokio::sync::watch;

/// Signal that stops a running crawl
///
/// Clones share the same signal. Triggering it makes the controlling loop
/// stop dispatching pages, makes the fetch client give up between retry
/// attempts, and lets asset workers drain without starting new downloads.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: std::sync::Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: std::sync::Arc::new(sender),
            receiver,
        }
    }

    /// Requests shutdown; calling it again has no effect
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once shutdown has been requested
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any clone of self, so this cannot fail
        // while we hold one; an error still means nobody can trigger anymore.
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }

    /// Drives shutdown from a stream of interrupt signals
    ///
    /// `next_signal` resolves to true for each interrupt and false once no
    /// more can arrive. The first interrupt triggers a graceful shutdown; a
    /// second one calls `force`, which is expected to end the process.
    pub async fn on_interrupts<S, F>(&self, mut next_signal: S, force: impl FnOnce())
    where
        S: FnMut() -> F,
        F: Future<Output = bool>,
    {
        if !next_signal().await {
            return;
        }
        tracing::warn!(
            "Interrupt received, stopping after in-flight downloads (interrupt again to quit now)"
        );
        self.trigger();

        if next_signal().await {
            tracing::warn!("Second interrupt received, exiting without waiting");
            force();
        }
    }
}
