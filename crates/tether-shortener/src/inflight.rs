use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counts deletion requests that were accepted but not yet flushed.
///
/// Incremented before an item enters the intake channel and decremented
/// after the flush that contained it resolves, so a waiter never observes
/// zero while an enqueue is still in flight.
#[derive(Debug, Default)]
pub(crate) struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

impl Inflight {
    pub(crate) fn begin(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn complete(&self, n: usize) {
        if n == 0 {
            return;
        }
        let previous = self.count.fetch_sub(n, Ordering::AcqRel);
        debug_assert!(previous >= n, "inflight counter underflow");
        if previous == n {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolves once the counter reaches zero.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before the check so a notification in between is not lost.
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
