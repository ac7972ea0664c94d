//! Timetable refresh scheduler: daily re-fetch with cache fallback.
//!
//! State machine over {Uninitialized, Fetching, Ready, Degraded}:
//!
//! - Startup attempts a remote fetch. On success the timetable is cached
//!   and published (Ready). On failure the last persisted copy is loaded
//!   instead (Degraded: still serving, retried on the normal schedule).
//!   If both fail there is no valid timetable and startup itself fails;
//!   the system never publishes a fabricated state.
//! - A recurring wake-up fires 15 minutes past the next local midnight.
//!   The fetch runs on a short-lived worker thread so the wake-up loop
//!   stays responsive; the result lands as one atomic replacement of the
//!   whole `SharedTimetable` reference.
//! - Every successful transition into Ready invokes the `on_ready` hook so
//!   the tracker can recompute and re-arm both engines against the new
//!   data.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::constants::REFRESH_OFFSET_MINS;
use crate::sched::{WakeHandle, WakeScheduler};
use crate::source::TimetableSource;
use crate::timetable::{SharedTimetable, Timetable, start_of_local_day};

/// Hook invoked with the freshly published timetable after each successful
/// refresh (and once at startup).
pub type OnReady = Box<dyn Fn(&Timetable) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Uninitialized,
    Fetching,
    Ready,
    /// Serving the last-known-good cached timetable after a failed fetch.
    Degraded,
}

struct RefreshInner {
    source: Arc<dyn TimetableSource>,
    scheduler: Arc<WakeScheduler>,
    shared: SharedTimetable,
    timezone: Tz,
    state: Mutex<RefreshState>,
    on_ready: OnceLock<OnReady>,
    pending: Mutex<Option<WakeHandle>>,
}

/// Owns the cached timetable and keeps it fresh.
pub struct RefreshScheduler {
    inner: Arc<RefreshInner>,
}

impl RefreshScheduler {
    /// Acquire the initial timetable: fetch, else cache, else fail startup.
    pub fn start(
        source: Arc<dyn TimetableSource>,
        scheduler: Arc<WakeScheduler>,
        timezone: Tz,
    ) -> Result<Self> {
        log_block_start!("Initialising timetable");

        let (timetable, state) = match source.fetch() {
            Ok(timetable) => {
                if let Err(e) = source.store_cached(&timetable) {
                    log_warning!("Failed to cache fetched timetable: {e:#}");
                }
                (timetable, RefreshState::Ready)
            }
            Err(fetch_err) => {
                log_warning!("Remote fetch failed: {fetch_err:#}");
                log_indented!("Falling back to cached timetable");
                let timetable = source.load_cached().with_context(|| {
                    format!("no usable timetable: remote fetch failed ({fetch_err:#}) and cache load failed")
                })?;
                (timetable, RefreshState::Degraded)
            }
        };

        let stats = timetable.stats();
        log_decorated!(
            "Timetable covers {} dates ({} to {})",
            stats.number_of_dates,
            stats.min_date,
            stats.max_date
        );

        Ok(Self {
            inner: Arc::new(RefreshInner {
                source,
                scheduler,
                shared: SharedTimetable::new(timetable),
                timezone,
                state: Mutex::new(state),
                on_ready: OnceLock::new(),
                pending: Mutex::new(None),
            }),
        })
    }

    /// Handle to the cached timetable for engines and listeners.
    pub fn shared(&self) -> SharedTimetable {
        self.inner.shared.clone()
    }

    pub fn state(&self) -> RefreshState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(RefreshState::Degraded)
    }

    /// Install the ready hook, fire it once for the startup timetable, and
    /// arm the recurring daily refresh.
    pub fn run(&self, on_ready: OnReady) {
        let _ = self.inner.on_ready.set(on_ready);
        if let Some(hook) = self.inner.on_ready.get() {
            hook(&self.inner.shared.load());
        }
        Self::arm_next(&self.inner);
    }

    /// Cancel the pending refresh wake-up.
    pub fn stop(&self) {
        if let Ok(mut pending) = self.inner.pending.lock()
            && let Some(handle) = pending.take()
        {
            handle.cancel();
        }
    }

    fn arm_next(inner: &Arc<RefreshInner>) {
        let due = next_refresh_instant(crate::time_source::now_utc(), inner.timezone);
        log_decorated!("Next timetable refresh at {}", due.format("%Y-%m-%d %H:%M %Z"));

        let weak = Arc::downgrade(inner);
        let handle = inner.scheduler.schedule_at(due, move || {
            Self::on_refresh_due(&weak);
        });
        if let Ok(mut pending) = inner.pending.lock() {
            *pending = Some(handle);
        }
    }

    fn on_refresh_due(weak: &Weak<RefreshInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if let Ok(mut state) = inner.state.lock() {
            *state = RefreshState::Fetching;
        }

        // The fetch may block on the network; keep it off the timer thread.
        let worker_inner = Arc::clone(&inner);
        let spawned = std::thread::Builder::new()
            .name("luptr-refresh".to_string())
            .spawn(move || {
                Self::perform_refresh(&worker_inner);
                Self::arm_next(&worker_inner);
            });
        if spawned.is_err() {
            // Could not offload; refresh inline rather than skip a day.
            Self::perform_refresh(&inner);
            Self::arm_next(&inner);
        }
    }

    fn perform_refresh(inner: &Arc<RefreshInner>) {
        log_block_start!("Refreshing timetable");
        match inner.source.fetch() {
            Ok(timetable) => {
                if let Err(e) = inner.source.store_cached(&timetable) {
                    log_warning!("Failed to cache refreshed timetable: {e:#}");
                }
                let stats = timetable.stats();
                inner.shared.store(timetable);
                if let Ok(mut state) = inner.state.lock() {
                    *state = RefreshState::Ready;
                }
                log_decorated!(
                    "Timetable refreshed: {} dates ({} to {})",
                    stats.number_of_dates,
                    stats.min_date,
                    stats.max_date
                );
                if let Some(hook) = inner.on_ready.get() {
                    hook(&inner.shared.load());
                }
            }
            Err(e) => {
                // Keep serving the previous timetable until the next pass.
                if let Ok(mut state) = inner.state.lock() {
                    *state = RefreshState::Degraded;
                }
                log_warning!("Timetable refresh failed: {e:#}");
                log_indented!("Continuing with the previously cached timetable");
            }
        }
    }
}

/// The recurring refresh fires shortly after the NEXT local midnight, so a
/// refresh landing late in the evening still reschedules for tomorrow.
fn next_refresh_instant(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let next_day = now.with_timezone(&timezone).date_naive() + Duration::days(1);
    start_of_local_day(timezone, next_day) + Duration::minutes(REFRESH_OFFSET_MINS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{three_day_timetable, utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSource {
        fail_fetch: AtomicBool,
        cached: Mutex<Option<Timetable>>,
        fetch_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(fail_fetch: bool, cached: Option<Timetable>) -> Self {
            Self {
                fail_fetch: AtomicBool::new(fail_fetch),
                cached: Mutex::new(cached),
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    impl TimetableSource for FakeSource {
        fn fetch(&self) -> Result<Timetable> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                anyhow::bail!("remote unreachable");
            }
            let mut fetched = three_day_timetable();
            fetched.source_id = "remote".to_string();
            Ok(fetched)
        }

        fn load_cached(&self) -> Result<Timetable> {
            self.cached
                .lock()
                .unwrap()
                .clone()
                .context("no cached timetable")
        }

        fn store_cached(&self, timetable: &Timetable) -> Result<()> {
            *self.cached.lock().unwrap() = Some(timetable.clone());
            Ok(())
        }
    }

    fn cached_fixture() -> Timetable {
        let mut tt = three_day_timetable();
        tt.source_id = "cache".to_string();
        tt
    }

    #[test]
    fn startup_fetch_success_is_ready_and_caches() {
        let source = Arc::new(FakeSource::new(false, None));
        let scheduler = Arc::new(WakeScheduler::new());
        let refresh =
            RefreshScheduler::start(source.clone(), scheduler, chrono_tz::Europe::London).unwrap();

        assert_eq!(refresh.state(), RefreshState::Ready);
        assert_eq!(refresh.shared().load().source_id, "remote");
        assert!(source.cached.lock().unwrap().is_some());
    }

    #[test]
    fn startup_fetch_failure_falls_back_to_cache() {
        let source = Arc::new(FakeSource::new(true, Some(cached_fixture())));
        let scheduler = Arc::new(WakeScheduler::new());
        let refresh =
            RefreshScheduler::start(source, scheduler, chrono_tz::Europe::London).unwrap();

        assert_eq!(refresh.state(), RefreshState::Degraded);
        assert_eq!(refresh.shared().load().source_id, "cache");
    }

    #[test]
    fn startup_fails_when_fetch_and_cache_both_fail() {
        let source = Arc::new(FakeSource::new(true, None));
        let scheduler = Arc::new(WakeScheduler::new());
        let result = RefreshScheduler::start(source, scheduler, chrono_tz::Europe::London);
        assert!(result.is_err());
    }

    #[test]
    fn run_fires_on_ready_once_and_arms_the_daily_wakeup() {
        let source = Arc::new(FakeSource::new(false, None));
        let scheduler = Arc::new(WakeScheduler::new());
        let refresh =
            RefreshScheduler::start(source, scheduler.clone(), chrono_tz::Europe::London).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        refresh.run(Box::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 1);

        refresh.stop();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn refresh_replaces_the_whole_timetable_atomically() {
        let shared = SharedTimetable::new(cached_fixture());
        let mut readers = Vec::new();
        let stop = Arc::new(AtomicBool::new(false));

        for _ in 0..4 {
            let shared = shared.clone();
            let stop = Arc::clone(&stop);
            readers.push(std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let snapshot = shared.load();
                    // A snapshot is internally consistent: provenance and
                    // stats come from the same timetable instance.
                    assert!(snapshot.source_id == "cache" || snapshot.source_id == "remote");
                    assert_eq!(snapshot.stats().number_of_dates, 3);
                }
            }));
        }

        for _ in 0..100 {
            let mut fresh = three_day_timetable();
            fresh.source_id = "remote".to_string();
            shared.store(fresh);
            shared.store(cached_fixture());
        }

        stop.store(true, Ordering::SeqCst);
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn next_refresh_is_quarter_past_the_next_local_midnight() {
        // 2021-10-02 10:00 UTC, London (BST): next local midnight is
        // 23:00 UTC, so the refresh fires 23:15 UTC.
        let due = next_refresh_instant(utc(2021, 10, 2, 10, 0), chrono_tz::Europe::London);
        assert_eq!(due, utc(2021, 10, 2, 23, 15));

        // Even just after local midnight the target is the NEXT day.
        let due = next_refresh_instant(utc(2021, 10, 1, 23, 30), chrono_tz::Europe::London);
        assert_eq!(due, utc(2021, 10, 2, 23, 15));
    }
}
