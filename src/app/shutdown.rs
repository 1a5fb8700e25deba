//! Cooperative cancellation shared by jobs and the scheduler.

use tokio::sync::watch;

/// Receiving side of the process shutdown signal.
///
/// Backed by a `watch` channel carrying `true` once shutdown is requested.
/// A dropped sender never counts as a shutdown request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a signal and the sender that triggers it
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires, for one-off invocations
    #[must_use]
    pub fn never() -> Self {
        let (_tx, shutdown) = Self::channel();
        shutdown
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
