//! Prayer tracker: drives the two engines, publishes state, and keeps both
//! wake-ups armed.
//!
//! The tracker owns the derived state the host sees. Two self-re-arming
//! wake-ups keep it current:
//!
//! - the prayer-state wake fires at the engine's next transition, recomputes
//!   the snapshot, publishes, and re-arms at the new transition;
//! - the Islamic-date wake does the same at the date's next rollover.
//!
//! A timetable refresh cancels both wake-ups, recomputes everything against
//! the new data, and re-arms, so a transition instant that moved with the
//! new timetable is never fired at its stale instant.
//!
//! ## Wake-up ownership
//!
//! Refreshes arrive on the refresh worker thread while engine wake-ups fire
//! on the timer thread, and a wake that has already fired can no longer be
//! cancelled. Each recompute therefore carries the epoch it was armed
//! under: a refresh (or stop) advances the epoch, and a stale-epoch wake
//! returns without recomputing or re-arming. The epoch check and the
//! arm happen under the engine's wake-slot lock, so at most one wake chain
//! per engine survives any interleaving of refreshes and firings.
//!
//! Publishing goes through the `StatePublisher` seam so the daemon can log,
//! an embedder can forward to a home-automation bus, and tests can record.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::config::{Config, RolloverPolicy, TrackedEvents};
use crate::islamic_date::{IslamicDateSnapshot, islamic_date_and_rollover};
use crate::sched::{WakeHandle, WakeScheduler};
use crate::state::current_state_and_next;
use crate::timetable::{SharedTimetable, TimetableStats};

/// Where published states land. The daemon logs them; embedders forward
/// them to whatever surface they expose.
pub trait StatePublisher: Send + Sync {
    fn publish(&self, state: &str, attributes: &StateAttributes);
}

/// The full attribute set accompanying each published state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateAttributes {
    pub islamic_year: i32,
    pub islamic_month: String,
    pub islamic_day: u32,
    /// Composite display date, e.g. "25 Safar 1443".
    pub islamic_date: String,
    /// `next_<event>` table: next occurrence of every tracked event.
    #[serde(flatten)]
    pub next_times: BTreeMap<String, DateTime<Utc>>,
    #[serde(flatten)]
    pub stats: TimetableStats,
}

#[derive(Debug, Clone)]
struct Derived {
    state: String,
    islamic: IslamicDateSnapshot,
    next_times: BTreeMap<String, DateTime<Utc>>,
    stats: TimetableStats,
}

struct TrackerInner {
    shared: SharedTimetable,
    scheduler: Arc<WakeScheduler>,
    tracked: TrackedEvents,
    zawaal_window: Duration,
    rollover_policy: RolloverPolicy,
    publisher: Arc<dyn StatePublisher>,
    derived: Mutex<Option<Derived>>,
    state_wake: Mutex<Option<WakeHandle>>,
    date_wake: Mutex<Option<WakeHandle>>,
    /// Advanced by every refresh and by stop; wakes armed under an older
    /// epoch return without recomputing.
    epoch: AtomicU64,
    /// Serializes whole refresh passes so two concurrent refreshes cannot
    /// cancel each other's freshly armed wakes.
    refresh_lock: Mutex<()>,
    stopped: AtomicBool,
}

/// Publishes the prayer state and Islamic date, re-arming itself at every
/// transition.
pub struct PrayerTracker {
    inner: Arc<TrackerInner>,
}

impl PrayerTracker {
    pub fn new(
        shared: SharedTimetable,
        scheduler: Arc<WakeScheduler>,
        config: &Config,
        publisher: Arc<dyn StatePublisher>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(TrackerInner {
                shared,
                scheduler,
                tracked: TrackedEvents::from_config(config),
                zawaal_window: config.zawaal_window(),
                rollover_policy: config.rollover_policy(),
                publisher,
                derived: Mutex::new(None),
                state_wake: Mutex::new(None),
                date_wake: Mutex::new(None),
                epoch: AtomicU64::new(0),
                refresh_lock: Mutex::new(()),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// React to a freshly published timetable: invalidate in-flight wakes,
    /// drop both pending wake-ups (their instants were computed against the
    /// old data), recompute, and re-arm against the new timetable.
    pub fn on_timetable_refresh(&self) {
        let Ok(_guard) = self.inner.refresh_lock.lock() else {
            return;
        };
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        cancel_wake(&self.inner.state_wake);
        cancel_wake(&self.inner.date_wake);
        Self::update_islamic_date(&self.inner, epoch);
        Self::update_prayer_state(&self.inner, epoch);
    }

    /// Current published state, if a snapshot has been computed.
    pub fn state(&self) -> Option<String> {
        self.inner
            .derived
            .lock()
            .ok()
            .and_then(|d| d.as_ref().map(|d| d.state.clone()))
    }

    pub fn attributes(&self) -> Option<StateAttributes> {
        self.inner
            .derived
            .lock()
            .ok()
            .and_then(|d| d.as_ref().map(attributes_of))
    }

    /// Detach: cancel both wake-ups and suppress any in-flight callback.
    /// Safe to call more than once.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        cancel_wake(&self.inner.state_wake);
        cancel_wake(&self.inner.date_wake);
    }

    fn update_prayer_state(inner: &Arc<TrackerInner>, epoch: u64) {
        // Holding the slot lock makes the epoch check and the arm atomic
        // with respect to cancel_wake.
        let Ok(mut wake) = inner.state_wake.lock() else {
            return;
        };
        if inner.stopped.load(Ordering::SeqCst) || inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let timetable = inner.shared.load();
        let now = crate::time_source::now_utc();

        let snapshot =
            match current_state_and_next(&timetable, &inner.tracked, now, inner.zawaal_window) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log_error!("Cannot compute prayer state: {e}");
                    return;
                }
            };

        log_decorated!(
            "Prayer state: {} (until {})",
            snapshot.state,
            snapshot.next_transition.format("%Y-%m-%d %H:%M %Z")
        );

        {
            let mut derived = match inner.derived.lock() {
                Ok(derived) => derived,
                Err(_) => return,
            };
            match derived.as_mut() {
                Some(derived) => {
                    derived.state = snapshot.state;
                    derived.next_times = snapshot.next_times;
                    derived.stats = timetable.stats();
                }
                None => {
                    // First pass before the date engine has run; compute the
                    // date inline so the snapshot is complete.
                    let islamic = match islamic_date_and_rollover(
                        &timetable,
                        now,
                        inner.rollover_policy,
                    ) {
                        Ok(islamic) => islamic,
                        Err(e) => {
                            log_error!("Cannot compute Islamic date: {e}");
                            return;
                        }
                    };
                    *derived = Some(Derived {
                        state: snapshot.state,
                        islamic,
                        next_times: snapshot.next_times,
                        stats: timetable.stats(),
                    });
                }
            }
        }
        Self::publish_current(inner);

        let weak = Arc::downgrade(inner);
        let handle = inner.scheduler.schedule_at(snapshot.next_transition, move || {
            Self::on_wake(&weak, epoch, Self::update_prayer_state);
        });
        *wake = Some(handle);
    }

    fn update_islamic_date(inner: &Arc<TrackerInner>, epoch: u64) {
        let Ok(mut wake) = inner.date_wake.lock() else {
            return;
        };
        if inner.stopped.load(Ordering::SeqCst) || inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let timetable = inner.shared.load();
        let now = crate::time_source::now_utc();

        let islamic = match islamic_date_and_rollover(&timetable, now, inner.rollover_policy) {
            Ok(islamic) => islamic,
            Err(e) => {
                log_error!("Cannot compute Islamic date: {e}");
                return;
            }
        };

        log_decorated!(
            "Islamic date: {} (rolls over {})",
            islamic.formatted(),
            islamic.next_rollover.format("%Y-%m-%d %H:%M %Z")
        );

        let rollover = islamic.next_rollover;
        let published = {
            let mut derived = match inner.derived.lock() {
                Ok(derived) => derived,
                Err(_) => return,
            };
            if let Some(derived) = derived.as_mut() {
                derived.islamic = islamic;
                derived.stats = timetable.stats();
                true
            } else {
                // The state engine has not published yet; it will pick the
                // date up on its first pass.
                false
            }
        };
        if published {
            Self::publish_current(inner);
        }

        let weak = Arc::downgrade(inner);
        let handle = inner.scheduler.schedule_at(rollover, move || {
            Self::on_wake(&weak, epoch, Self::update_islamic_date);
        });
        *wake = Some(handle);
    }

    fn on_wake(weak: &Weak<TrackerInner>, epoch: u64, update: fn(&Arc<TrackerInner>, u64)) {
        if let Some(inner) = weak.upgrade() {
            update(&inner, epoch);
        }
    }

    fn publish_current(inner: &Arc<TrackerInner>) {
        let Ok(derived) = inner.derived.lock() else {
            return;
        };
        if let Some(derived) = derived.as_ref() {
            inner
                .publisher
                .publish(&derived.state, &attributes_of(derived));
        }
    }
}

fn attributes_of(derived: &Derived) -> StateAttributes {
    StateAttributes {
        islamic_year: derived.islamic.year,
        islamic_month: derived.islamic.month.clone(),
        islamic_day: derived.islamic.day,
        islamic_date: derived.islamic.formatted(),
        next_times: derived.next_times.clone(),
        stats: derived.stats.clone(),
    }
}

fn cancel_wake(slot: &Mutex<Option<WakeHandle>>) {
    if let Ok(mut slot) = slot.lock()
        && let Some(handle) = slot.take()
    {
        handle.cancel();
    }
}
