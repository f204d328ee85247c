//! In-flight accounting for drain-on-shutdown
//!
//! Counts messages accepted by the ingress but not yet terminated by the
//! dispatcher. Shutdown blocks on the count reaching zero, which is the
//! pipeline's quiescence condition: nothing queued and nothing mid-send.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Concurrent counter with wait-for-zero.
///
/// Incremented once per accepted enqueue, decremented exactly once per
/// dispatcher-completed item. Clones share the same counter.
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicI64,
    /// Wakes the single shutdown waiter when the count reaches zero
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one accepted message.
    pub fn add(&self) {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Account for one terminated message (delivered, failed, or
    /// skipped).
    pub fn done(&self) {
        let remaining = self.inner.count.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(remaining >= 0, "in-flight count went negative");
        if remaining <= 0 {
            self.inner.idle.notify_one();
        }
    }

    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Wait until every outstanding message has terminated. Intended for
    /// a single waiter; returns immediately if nothing is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.count() <= 0 {
                return;
            }
            notified.await;
        }
    }
}
