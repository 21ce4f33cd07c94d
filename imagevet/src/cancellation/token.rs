//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

struct CleanupCallback {
    name: String,
    callback: Box<dyn Fn() + Send + Sync>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<CleanupCallback>>,
    notify: Notify,
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first reason is kept. Cleanup
/// callbacks registered on the token run once, in LIFO order, when
/// cancellation fires; panics in callbacks are logged and suppressed so one
/// faulty cleanup cannot block the rest.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Idempotent - only the first reason is kept. Waiters on
    /// [`cancelled`](Self::cancelled) are woken and cleanup callbacks run
    /// immediately.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            self.inner.notify.notify_waiters();

            let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
            for entry in callbacks.into_iter().rev() {
                run_callback(&entry);
            }
        }
    }

    /// Registers a named cleanup callback to run on cancellation.
    ///
    /// If the token is already cancelled, the callback runs immediately.
    pub fn on_cancel<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = CleanupCallback {
            name: name.into(),
            callback: Box::new(callback),
        };
        if self.is_cancelled() {
            run_callback(&entry);
        } else {
            self.inner.callbacks.lock().push(entry);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            // Re-check after registering the waiter so a cancel between the
            // loop condition and `notified()` cannot be missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

fn run_callback(entry: &CleanupCallback) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (entry.callback)())).is_err() {
        warn!(callback = %entry.name, "cleanup callback panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("deadline elapsed");
        token.cancel("second reason");
        assert_eq!(token.reason(), Some("deadline elapsed".to_string()));
    }

    #[test]
    fn callbacks_run_in_lifo_order() {
        let token = CancellationToken::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let order = order.clone();
            token.on_cancel(label, move || order.lock().push(label));
        }
        token.cancel("test");

        assert_eq!(*order.lock(), vec!["second", "first"]);
    }

    #[test]
    fn callback_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel("test");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        token.on_cancel("late", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_panic_is_suppressed() {
        let token = CancellationToken::new();
        token.on_cancel("bad", || panic!("intentional"));
        token.cancel("test");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let token = CancellationToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("test");

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_future_resolves_if_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("test");
        token.cancelled().await;
    }
}
