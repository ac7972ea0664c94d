//! Cancellable single-shot wake-up scheduler.
//!
//! The host-facing generalization of a "wake me at instant T" primitive:
//! `schedule_at` registers a callback for an absolute instant and returns a
//! `WakeHandle` that can cancel it. Callbacks run on one timer thread, so
//! all recomputation driven by wake-ups happens on a single logical
//! scheduling thread; anything that may block for real wall-clock time
//! (the remote timetable fetch) is pushed onto a worker thread by its
//! caller instead of running here.
//!
//! The timer thread re-derives the wait from the current clock on every
//! pass, so a backward clock jump delays nothing permanently and no drift
//! compounds: the next wake-up is always computed freshly from the
//! corrected instant.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::constants::{SCHEDULER_IDLE_WAIT_SECS, SCHEDULER_MAX_WAIT_SECS};
use crate::time_source::TimeSource;

type WakeCallback = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    due: DateTime<Utc>,
    callback: WakeCallback,
}

/// Default clock: reads whatever the process-wide time source is.
struct GlobalClock;

impl TimeSource for GlobalClock {
    fn now_utc(&self) -> DateTime<Utc> {
        crate::time_source::now_utc()
    }
}

struct Inner {
    queue: Mutex<HashMap<u64, Pending>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    time: Arc<dyn TimeSource>,
}

impl Inner {
    /// Remove a pending entry. Safe to call for ids that already fired.
    fn cancel(&self, id: u64) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.remove(&id);
            self.wakeup.notify_all();
        }
    }
}

/// Handle to one pending wake-up.
///
/// Dropping the handle does NOT cancel the wake-up; cancellation is always
/// explicit. Cancelling twice, or cancelling after the callback has fired,
/// is a no-op.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl WakeHandle {
    pub fn cancel(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel(self.id);
        }
    }
}

/// Timer-thread scheduler for cancellable single-shot wake-ups.
pub struct WakeScheduler {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl WakeScheduler {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(GlobalClock))
    }

    /// Build a scheduler reading its clock from `time` instead of the
    /// process-wide time source. Lets tests step or jump the clock without
    /// touching global state.
    pub fn with_time_source(time: Arc<dyn TimeSource>) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(HashMap::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            time,
        });

        let worker = Arc::clone(&inner);
        let thread = std::thread::Builder::new()
            .name("luptr-sched".to_string())
            .spawn(move || run_timer_loop(&worker))
            .ok();

        Self { inner, thread }
    }

    /// Register `callback` to run once at `due`. Instants already in the
    /// past fire on the timer thread's next pass.
    pub fn schedule_at(
        &self,
        due: DateTime<Utc>,
        callback: impl FnOnce() + Send + 'static,
    ) -> WakeHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.insert(
                id,
                Pending {
                    due,
                    callback: Box::new(callback),
                },
            );
        }
        self.inner.wakeup.notify_all();
        WakeHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of wake-ups currently pending (diagnostics and tests).
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for WakeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WakeScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_timer_loop(inner: &Arc<Inner>) {
    loop {
        let Ok(mut queue) = inner.queue.lock() else {
            return;
        };
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let now = inner.time.now_utc();
        let earliest = queue
            .iter()
            .min_by_key(|(_, pending)| pending.due)
            .map(|(id, pending)| (*id, pending.due));

        match earliest {
            Some((id, due)) if due <= now => {
                // Remove before invoking so a re-arm from inside the
                // callback sees a consistent queue.
                if let Some(pending) = queue.remove(&id) {
                    drop(queue);
                    (pending.callback)();
                }
            }
            Some((_, due)) => {
                let wait = (due - now)
                    .to_std()
                    .unwrap_or(StdDuration::ZERO)
                    .min(StdDuration::from_secs(SCHEDULER_MAX_WAIT_SECS));
                let _ = inner.wakeup.wait_timeout(queue, wait);
            }
            None => {
                let wait = StdDuration::from_secs(SCHEDULER_IDLE_WAIT_SECS);
                let _ = inner.wakeup.wait_timeout(queue, wait);
            }
        }
    }
}
