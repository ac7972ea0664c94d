//! Trigger listener: fires a host action at a tracked event, with a signed
//! offset.
//!
//! The offset shifts the firing instant, not the lookup: the next fire time
//! is the next occurrence of the event as seen from `now - offset`, shifted
//! back by `offset`. Querying through the shifted instant is what makes a
//! negative offset work right after the un-shifted occurrence has passed:
//! the lookup rolls to the following day's occurrence instead of producing
//! a fire time already in the past.
//!
//! Each firing re-arms the listener before invoking the action, so an
//! action that blocks or panics cannot silence the series. `detach` is
//! idempotent; after it returns no further firings are delivered.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sched::{WakeHandle, WakeScheduler};
use crate::timetable::{SharedTimetable, TimetableError};

type TriggerAction = Box<dyn Fn() + Send + Sync>;

struct TriggerInner {
    shared: SharedTimetable,
    scheduler: Arc<WakeScheduler>,
    event: String,
    offset: Duration,
    action: TriggerAction,
    pending: Mutex<Option<WakeHandle>>,
    detached: AtomicBool,
}

/// A listener armed for the next (offset) occurrence of one tracked event.
pub struct TriggerListener {
    inner: Arc<TriggerInner>,
}

impl TriggerListener {
    /// Attach a listener: compute the first fire time and arm it.
    ///
    /// Fails if the event cannot be resolved against the current timetable
    /// (unknown event name, or the offset query falls outside its range).
    pub fn attach(
        shared: SharedTimetable,
        scheduler: Arc<WakeScheduler>,
        event: impl Into<String>,
        offset: Duration,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, TimetableError> {
        let inner = Arc::new(TriggerInner {
            shared,
            scheduler,
            event: event.into(),
            offset,
            action: Box::new(action),
            pending: Mutex::new(None),
            detached: AtomicBool::new(false),
        });

        log_decorated!("Attaching trigger for {}", inner.event);
        Self::arm(&inner, crate::time_source::now_utc())?;
        Ok(Self { inner })
    }

    /// Next fire time as seen from `at`. Pure; exposed for embedders that
    /// want to display upcoming firings.
    pub fn calculate_next_time(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>, TimetableError> {
        next_fire_time(&self.inner.shared, &self.inner.event, self.inner.offset, at)
    }

    /// Stop firing. Idempotent; a second detach is a no-op.
    pub fn detach(&self) {
        if self.inner.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        log_decorated!("Detaching trigger for {}", self.inner.event);
        if let Ok(mut pending) = self.inner.pending.lock()
            && let Some(handle) = pending.take()
        {
            handle.cancel();
        }
    }

    fn arm(inner: &Arc<TriggerInner>, at: DateTime<Utc>) -> Result<(), TimetableError> {
        let due = next_fire_time(&inner.shared, &inner.event, inner.offset, at)?;
        let weak = Arc::downgrade(inner);
        let handle = inner.scheduler.schedule_at(due, move || {
            Self::on_fire(&weak);
        });
        if let Ok(mut pending) = inner.pending.lock() {
            *pending = Some(handle);
        }
        Ok(())
    }

    fn on_fire(weak: &Weak<TriggerInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.detached.load(Ordering::SeqCst) {
            return;
        }
        // Re-arm before running the action.
        if let Err(e) = Self::arm(&inner, crate::time_source::now_utc()) {
            log_error!("Cannot re-arm trigger for {}: {e}", inner.event);
        }
        (inner.action)();
    }
}

fn next_fire_time(
    shared: &SharedTimetable,
    event: &str,
    offset: Duration,
    at: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimetableError> {
    let occurrence = shared.load().next_occurrence(event, at - offset)?;
    Ok(occurrence.instant + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{daily_timetable_around, three_day_timetable, utc};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration as StdDuration;

    fn next_time(
        event: &str,
        offset: Duration,
        at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let shared = SharedTimetable::new(three_day_timetable());
        next_fire_time(&shared, event, offset, at).unwrap()
    }

    #[test]
    fn zero_offset_fires_at_the_event() {
        assert_eq!(
            next_time("Zuhr Begins", Duration::zero(), utc(2021, 10, 2, 11, 30)),
            utc(2021, 10, 2, 11, 55)
        );
    }

    #[test]
    fn positive_offset_fires_after_the_event() {
        assert_eq!(
            next_time("Zuhr Begins", Duration::minutes(30), utc(2021, 10, 2, 11, 30)),
            utc(2021, 10, 2, 12, 25)
        );
    }

    #[test]
    fn negative_offset_fires_before_the_event() {
        assert_eq!(
            next_time("Zuhr Begins", Duration::minutes(-30), utc(2021, 10, 2, 11, 0)),
            utc(2021, 10, 2, 11, 25)
        );
    }

    #[test]
    fn negative_offset_rolls_to_the_next_day_once_its_fire_time_passed() {
        // 11:26 is past today's 11:25 fire time even though today's Zuhr
        // (11:55) is still ahead; the shifted lookup lands on tomorrow.
        assert_eq!(
            next_time("Zuhr Begins", Duration::minutes(-30), utc(2021, 10, 2, 11, 26)),
            utc(2021, 10, 3, 11, 24)
        );
    }

    #[test]
    fn whole_day_offsets_shift_the_lookup_day() {
        assert_eq!(
            next_time("Sunrise", Duration::days(1), utc(2021, 10, 2, 5, 58)),
            utc(2021, 10, 3, 6, 0)
        );
        assert_eq!(
            next_time("Sunrise", Duration::days(-1), utc(2021, 10, 1, 6, 0)),
            utc(2021, 10, 2, 6, 2)
        );
    }

    #[test]
    fn attach_rejects_unknown_events() {
        let now = Utc::now();
        let shared = SharedTimetable::new(daily_timetable_around(&[(
            "Zuhr Begins",
            now + chrono::Duration::hours(1),
        )]));
        let scheduler = Arc::new(WakeScheduler::new());
        let result = TriggerListener::attach(
            shared,
            scheduler,
            "No Such Event",
            Duration::zero(),
            || {},
        );
        assert!(result.is_err());
    }

    #[test]
    fn fires_and_re_arms_for_the_next_occurrence() {
        let now = Utc::now();
        let shared = SharedTimetable::new(daily_timetable_around(&[(
            "Zuhr Begins",
            now + chrono::Duration::milliseconds(200),
        )]));
        let scheduler = Arc::new(WakeScheduler::new());

        let (tx, rx) = mpsc::channel();
        let listener = TriggerListener::attach(
            shared,
            scheduler.clone(),
            "Zuhr Begins",
            Duration::zero(),
            move || {
                let _ = tx.send(());
            },
        )
        .unwrap();

        rx.recv_timeout(StdDuration::from_secs(5)).unwrap();
        // Re-armed for tomorrow's occurrence before the action ran.
        assert_eq!(scheduler.pending(), 1);
        listener.detach();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn detach_is_idempotent_and_stops_firing() {
        let now = Utc::now();
        let shared = SharedTimetable::new(daily_timetable_around(&[(
            "Zuhr Begins",
            now + chrono::Duration::milliseconds(150),
        )]));
        let scheduler = Arc::new(WakeScheduler::new());

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let listener = TriggerListener::attach(
            shared,
            scheduler.clone(),
            "Zuhr Begins",
            Duration::zero(),
            move || {
                fired2.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        listener.detach();
        listener.detach();
        assert_eq!(scheduler.pending(), 0);

        std::thread::sleep(StdDuration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn calculate_next_time_applies_the_offset() {
        let now = Utc::now();
        let maghrib = now + chrono::Duration::hours(1);
        let shared = SharedTimetable::new(daily_timetable_around(&[("Maghrib Begins", maghrib)]));
        let scheduler = Arc::new(WakeScheduler::new());
        let listener = TriggerListener::attach(
            shared,
            scheduler,
            "Maghrib Begins",
            Duration::minutes(5),
            || {},
        )
        .unwrap();
        assert_eq!(
            listener.calculate_next_time(now).unwrap(),
            maghrib + Duration::minutes(5)
        );
        listener.detach();
    }
}
