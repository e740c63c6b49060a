use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts in-flight units of external work so the drain phase can tell when it is done.
#[derive(Debug, Default)]
pub struct DrainTracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Marks one unit of in-flight work; dropping it completes the unit.
#[derive(Debug)]
pub struct WorkGuard {
    tracker: Arc<DrainTracker>,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(self: &Arc<Self>) -> WorkGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no work is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent final drop cannot be missed
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
