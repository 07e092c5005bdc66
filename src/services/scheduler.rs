//! Timer scheduling with cancellable handles.
//!
//! Every timer the broker starts (sweeper, reconnect, popup auto-hide) goes
//! through a [`Scheduler`] so teardown can cancel all pending work at once.
//! After [`Scheduler::cancel_all`] the scheduler is closed and refuses new timers.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Default)]
struct SchedulerInner {
    timers: DashMap<u64, AbortHandle>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Handle to a scheduled timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    abort: AbortHandle,
    inner: Arc<SchedulerInner>,
}

impl TimerHandle {
    /// Cancel the timer. Idempotent; a timer that already fired is unaffected.
    pub fn cancel(&self) {
        self.abort.abort();
        self.inner.timers.remove(&self.id);
    }
}

/// Spawns timers on the tokio runtime and tracks them for bulk cancellation.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`. Returns `None` when the scheduler is closed.
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> Option<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            debug!("Scheduler closed, dropping one-shot timer");
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        // The task waits until it is registered, so its own removal always follows the insert.
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            inner.timers.remove(&id);
            task.await;
        });

        let timer = self.register(id, handle.abort_handle(), handle.abort_handle());
        let _ = armed_tx.send(());
        Some(timer)
    }

    /// Run `tick` every `period`, first after one full period. Returns `None` when closed.
    pub fn schedule_repeating<F>(&self, period: Duration, mut tick: F) -> Option<TimerHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_closed() {
            debug!("Scheduler closed, dropping repeating timer");
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick();
            }
        });

        Some(self.register(id, handle.abort_handle(), handle.abort_handle()))
    }

    fn register(&self, id: u64, tracked: AbortHandle, abort: AbortHandle) -> TimerHandle {
        self.inner.timers.insert(id, tracked);
        // cancel_all may have run between the closed check and the insert.
        if self.is_closed() {
            abort.abort();
            self.inner.timers.remove(&id);
        }

        TimerHandle {
            id,
            abort,
            inner: self.inner.clone(),
        }
    }

    /// Cancel every pending timer and close the scheduler.
    pub fn cancel_all(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.inner.timers.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, abort)) = self.inner.timers.remove(&id) {
                abort.abort();
            }
        }
        debug!("Scheduler closed, all timers cancelled");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of timers still registered.
    pub fn pending(&self) -> usize {
        self.inner.timers.len()
    }
}
