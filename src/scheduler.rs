//! Self re-arming delayed task.
//!
//! A single worker thread owns one tick slot. Once armed, the job runs after
//! the delay and the slot re-arms itself with the fixed interval when the job
//! returns. Ticks never overlap. [`TickSchedule::cancel_sync`] clears the
//! pending tick and waits for a running one to finish without re-arming.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::GovernorError;

pub trait TickSchedule: Send + Sync {
    /// Queue a tick after `delay`. No-op (returns `false`) if one is pending.
    fn arm(&self, delay: Duration) -> bool;

    /// Drop the pending tick and block until an in-flight tick has finished.
    /// No tick runs afterwards until the next [`arm`](Self::arm).
    fn cancel_sync(&self);
}

#[derive(Debug, Default)]
struct Slot {
    deadline: Option<Instant>,
    running: bool,
    cancelling: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Slot>) -> MutexGuard<'a, Slot> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PeriodicScheduler {
    shared: Arc<Shared>,
    interval: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicScheduler {
    /// Start the worker thread. Nothing runs until the first [`TickSchedule::arm`].
    pub fn spawn<F>(name: &str, interval: Duration, job: F) -> Result<Self, GovernorError>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_shared, interval, job))
            .map_err(GovernorError::Spawn)?;

        Ok(Self {
            shared,
            interval,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next tick is due, if one is queued.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.shared.lock().deadline
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Cancel, drain and stop the worker thread.
    pub fn shutdown(&self) {
        self.cancel_sync();
        self.shared.lock().shutdown = true;
        self.shared.cond.notify_all();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl TickSchedule for PeriodicScheduler {
    fn arm(&self, delay: Duration) -> bool {
        let mut slot = self.shared.lock();
        if slot.deadline.is_some() || slot.shutdown {
            return false;
        }
        slot.deadline = Some(Instant::now() + delay);
        self.shared.cond.notify_all();
        debug!(?delay, "tick armed");
        true
    }

    fn cancel_sync(&self) {
        let mut slot = self.shared.lock();
        slot.deadline = None;
        slot.cancelling = true;
        while slot.running {
            slot = self.shared.wait(slot);
        }
        slot.cancelling = false;
        debug!("tick cancelled");
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<F: Fn()>(shared: &Shared, interval: Duration, job: F) {
    let mut slot = shared.lock();
    loop {
        if slot.shutdown {
            return;
        }
        let Some(deadline) = slot.deadline else {
            slot = shared.wait(slot);
            continue;
        };
        let now = Instant::now();
        if now < deadline {
            slot = shared
                .cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        slot.deadline = None;
        slot.running = true;
        drop(slot);

        job();

        slot = shared.lock();
        slot.running = false;
        if !slot.cancelling && !slot.shutdown && slot.deadline.is_none() {
            slot.deadline = Some(Instant::now() + interval);
        }
        shared.cond.notify_all();
    }
}
