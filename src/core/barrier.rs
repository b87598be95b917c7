//! Completion barrier for the probes of one cycle.
//!
//! The barrier only counts: [`CompletionBarrier::begin`] registers a unit of
//! work and hands back a [`PendingGuard`]; the unit ends when that guard is
//! finished or dropped, so a probe can never end twice or forget to end,
//! even when its task panics. Waiters are woken when the count reaches zero
//! and additionally re-check the count every poll interval, so a wake-up that
//! races the check is never lost.
//!
//! Each cycle owns a fresh barrier; nothing is shared between cycles.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::Notify, time::sleep};
use tracing::trace;

/// Default re-check period, matching the short poll the agent has always used.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct CompletionBarrier {
    pending: AtomicUsize,
    notify: Notify,
    poll_interval: Duration,
}

impl CompletionBarrier {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            notify: Notify::new(),
            poll_interval,
        }
    }

    /// Registers one unit of pending work.
    pub fn begin(self: &Arc<Self>) -> PendingGuard {
        self.pending.fetch_add(1, Ordering::AcqRel);
        PendingGuard {
            barrier: Some(self.clone()),
        }
    }

    fn end(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Resolves once no work is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before looking at the count.
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep(self.poll_interval) => {
                    trace!(pending = self.pending(), "Barrier still busy");
                }
            }
        }
    }

    /// Waits for idleness, then runs `callback` exactly once.
    pub async fn on_idle<R>(&self, callback: impl FnOnce() -> R) -> R {
        self.wait_idle().await;
        callback()
    }
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("pending", &self.pending())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// One registered unit of work. Ends exactly once, on [`finish`] or drop.
///
/// [`finish`]: PendingGuard::finish
#[must_use = "dropping the guard immediately ends the pending work"]
pub struct PendingGuard {
    barrier: Option<Arc<CompletionBarrier>>,
}

impl PendingGuard {
    pub fn finish(mut self) {
        if let Some(barrier) = self.barrier.take() {
            barrier.end();
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(barrier) = self.barrier.take() {
            barrier.end();
        }
    }
}
