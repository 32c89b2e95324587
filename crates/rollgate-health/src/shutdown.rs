//! Cancellation signal shared by every wait in a probe.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Wraps the receiving half of a shutdown `watch` channel.
///
/// Flipping the channel to `true` cancels the probe at its next
/// suspension point. If the sender is dropped the probe is never
/// cancelled.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Returned when the shutdown signal fired before the work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is `true`.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the signal fires first.
    pub async fn run<F: Future>(&mut self, fut: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            out = fut => Ok(out),
            _ = self.cancelled() => Err(Cancelled),
        }
    }

    /// Sleep for `duration` unless the signal fires first.
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), Cancelled> {
        self.run(tokio::time::sleep(duration)).await
    }
}
