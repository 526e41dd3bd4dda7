//! One-shot cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// A cancellation flag shared between the work queue and an executing
/// operation.
///
/// Cancelling is one-shot and sticky: once set, every clone observes it, and
/// waiters that arrive later return immediately without a second signal.
/// Cancellation is cooperative; the running operation decides when to look.
///
/// # Examples
///
/// ```
/// use fpsim_engine::CancellationSignal;
///
/// let signal = CancellationSignal::new();
/// let reader = signal.clone();
///
/// assert!(!reader.is_cancelled());
/// assert!(signal.cancel());
/// assert!(!signal.cancel()); // already cancelled
/// assert!(reader.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    ///
    /// Returns `true` if this call set the flag, `false` if it was already set.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel cannot slip between.
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for cancellation.
    ///
    /// Returns `true` if cancellation was signalled within the timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.cancelled()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancelled().await;
        assert!(signal.wait_timeout(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_many_readers_one_signal() {
        let signal = CancellationSignal::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let reader = signal.clone();
                tokio::spawn(async move { reader.cancelled().await })
            })
            .collect();

        tokio::task::yield_now().await;
        signal.cancel();

        for waiter in waiters {
            waiter.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_expires_without_signal() {
        let signal = CancellationSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(50)).await);
        assert!(!signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_wakes_on_signal() {
        let signal = CancellationSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        assert!(signal.wait_timeout(Duration::from_secs(1)).await);
    }
}
