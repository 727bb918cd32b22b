//! Cancelable one-shot timers that post into the session inbox.
//!
//! A [`ScheduledTask`] owns a tokio task that sleeps and then sends a
//! message. Cancelling or dropping the handle aborts the task. Every timer
//! carries a [`TimerToken`]; the owner compares it against the handle it
//! currently holds, so an expiry that was already queued when the timer was
//! cancelled is recognized as stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a pending one-shot timer.
#[derive(Debug)]
pub struct ScheduledTask {
    token: TimerToken,
    abort: AbortHandle,
}

impl ScheduledTask {
    /// Post `make(token)` to `tx` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn after<T, F>(delay: Duration, tx: mpsc::UnboundedSender<T>, make: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce(TimerToken) -> T + Send + 'static,
    {
        let token = TimerToken::next();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the session already ended
            let _ = tx.send(make(token));
        });
        Self {
            token,
            abort: handle.abort_handle(),
        }
    }

    pub fn token(&self) -> TimerToken {
        self.token
    }

    /// Whether this handle scheduled the timer identified by `token`.
    pub fn is(&self, token: TimerToken) -> bool {
        self.token == token
    }

    /// Abort the timer. Consuming the handle makes double-cancel impossible.
    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
