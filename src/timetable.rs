//! Timetable data model, query contract, and the shared swappable handle.
//!
//! A timetable is an ordered collection of daily rows, each keyed by
//! Gregorian date and holding a mapping from event name to wall-clock time
//! in the timetable's zone, plus the parallel Islamic calendar fields.
//!
//! ## Query Contract
//!
//! Engines and listeners consume a narrow contract:
//! - `now_and_next`: the event currently in effect at an instant and the
//!   next one after it, wrapping across day boundaries
//! - `next_occurrence`: the next occurrence of one specific event
//! - `islamic_date`: Gregorian date to Islamic (year, month, day)
//! - `stats`: covered range and provenance summary
//!
//! An instant outside the covered range, or a tracked event absent from a
//! row, is a contract violation surfaced as a distinct `TimetableError`.
//! It is never silently defaulted, since a fabricated answer would
//! misreport the prayer state.
//!
//! ## Sharing
//!
//! The currently-cached timetable is held in a `SharedTimetable`: an
//! explicit, atomically-swappable handle injected into every component that
//! reads it. The refresh scheduler is the only writer and always replaces
//! the whole reference; a published `Timetable` is never mutated in place.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised by timetable queries. These indicate collaborator-contract
/// violations (bad data or an instant outside the covered range), not
/// recoverable runtime conditions.
#[derive(Debug, Error)]
pub enum TimetableError {
    #[error("timetable has no rows")]
    Empty,

    #[error("no tracked events supplied to query")]
    NoTrackedEvents,

    #[error("instant {instant} falls outside the covered range {min}..={max}")]
    OutOfRange {
        instant: DateTime<Utc>,
        min: NaiveDate,
        max: NaiveDate,
    },

    #[error("event '{event}' is missing from the row for {date}")]
    MissingEvent { event: String, date: NaiveDate },

    #[error("local time {time} on {date} does not exist in zone {zone}")]
    InvalidLocalTime {
        date: NaiveDate,
        time: NaiveTime,
        zone: Tz,
    },
}

/// One day's worth of timetable data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayRow {
    pub islamic_year: i32,
    pub islamic_month: String,
    pub islamic_day: u32,
    /// Event name to wall-clock time in the timetable's zone.
    pub times: HashMap<String, NaiveTime>,
}

/// Islamic calendar date as reported by the timetable.
#[derive(Debug, Clone, PartialEq)]
pub struct IslamicDate {
    pub year: i32,
    pub month: String,
    pub day: u32,
}

/// A named event paired with its absolute instant.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInstant {
    pub event: String,
    pub instant: DateTime<Utc>,
}

/// Summary statistics published as state attributes after each refresh.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimetableStats {
    pub number_of_dates: usize,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

/// An immutable, queryable prayer timetable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timetable {
    /// Provenance: which source built this timetable.
    pub source_id: String,
    /// Zone the row times are expressed in.
    pub timezone: Tz,
    /// When this timetable was built or last refreshed.
    pub last_updated: DateTime<Utc>,
    rows: BTreeMap<NaiveDate, DayRow>,
}

impl Timetable {
    /// Build a timetable from daily rows. Rejects empty input; everything
    /// else is validated lazily at query time so a partially-sparse source
    /// document still loads.
    pub fn new(
        source_id: impl Into<String>,
        timezone: Tz,
        last_updated: DateTime<Utc>,
        rows: BTreeMap<NaiveDate, DayRow>,
    ) -> Result<Self, TimetableError> {
        if rows.is_empty() {
            return Err(TimetableError::Empty);
        }
        Ok(Self {
            source_id: source_id.into(),
            timezone,
            last_updated,
            rows,
        })
    }

    pub fn min_date(&self) -> NaiveDate {
        // new() guarantees at least one row
        *self.rows.keys().next().unwrap_or(&NaiveDate::MIN)
    }

    pub fn max_date(&self) -> NaiveDate {
        *self.rows.keys().next_back().unwrap_or(&NaiveDate::MAX)
    }

    pub fn stats(&self) -> TimetableStats {
        TimetableStats {
            number_of_dates: self.rows.len(),
            min_date: self.min_date(),
            max_date: self.max_date(),
            last_updated: self.last_updated,
        }
    }

    /// Resolve the absolute instant of `event` on `date`.
    fn event_instant(&self, date: NaiveDate, event: &str) -> Result<DateTime<Utc>, TimetableError> {
        let row = self
            .rows
            .get(&date)
            .ok_or_else(|| self.out_of_range_at(date))?;
        let time = *row.times.get(event).ok_or_else(|| TimetableError::MissingEvent {
            event: event.to_string(),
            date,
        })?;
        local_instant(self.timezone, date, time).ok_or(TimetableError::InvalidLocalTime {
            date,
            time,
            zone: self.timezone,
        })
    }

    /// Find, among `events`, the one currently in effect at `at` and the
    /// next one after it.
    ///
    /// "Current" is the latest tracked event whose instant is <= `at`,
    /// wrapping to the previous day's last tracked event when `at` precedes
    /// the first tracked event of its day. "Next" is the earliest tracked
    /// instant strictly after `at`.
    pub fn now_and_next<S: AsRef<str>>(
        &self,
        events: &[S],
        at: DateTime<Utc>,
    ) -> Result<(EventInstant, EventInstant), TimetableError> {
        if events.is_empty() {
            return Err(TimetableError::NoTrackedEvents);
        }

        let local_date = at.with_timezone(&self.timezone).date_naive();
        let mut current: Option<EventInstant> = None;
        let mut next: Option<EventInstant> = None;

        // A daily cycle only ever needs the neighbouring rows: the previous
        // day for the pre-dawn wrap and the following day for the next event
        // after the last of today's cycle.
        for offset in -1..=1i64 {
            let date = local_date + Duration::days(offset);
            if !self.rows.contains_key(&date) {
                // Missing neighbours are tolerated as long as both answers
                // are found; otherwise we report out-of-range below.
                continue;
            }
            for event in events {
                let instant = self.event_instant(date, event.as_ref())?;
                if instant <= at {
                    if current.as_ref().is_none_or(|c| instant > c.instant) {
                        current = Some(EventInstant {
                            event: event.as_ref().to_string(),
                            instant,
                        });
                    }
                } else if next.as_ref().is_none_or(|n| instant < n.instant) {
                    next = Some(EventInstant {
                        event: event.as_ref().to_string(),
                        instant,
                    });
                }
            }
        }

        match (current, next) {
            (Some(current), Some(next)) => Ok((current, next)),
            _ => Err(self.out_of_range(at)),
        }
    }

    /// Next occurrence of one specific event after `from`, independent of
    /// which event is currently active.
    pub fn next_occurrence(
        &self,
        event: &str,
        from: DateTime<Utc>,
    ) -> Result<EventInstant, TimetableError> {
        let (_, next) = self.now_and_next(std::slice::from_ref(&event), from)?;
        Ok(next)
    }

    /// Islamic calendar date for a Gregorian date within the covered range.
    pub fn islamic_date(&self, date: NaiveDate) -> Result<IslamicDate, TimetableError> {
        let row = self
            .rows
            .get(&date)
            .ok_or_else(|| self.out_of_range_at(date))?;
        Ok(IslamicDate {
            year: row.islamic_year,
            month: row.islamic_month.clone(),
            day: row.islamic_day,
        })
    }

    fn out_of_range(&self, instant: DateTime<Utc>) -> TimetableError {
        TimetableError::OutOfRange {
            instant,
            min: self.min_date(),
            max: self.max_date(),
        }
    }

    fn out_of_range_at(&self, date: NaiveDate) -> TimetableError {
        let time = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        let instant = local_instant(self.timezone, date, time)
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(time)));
        self.out_of_range(instant)
    }
}

/// Resolve a wall-clock time in `zone` to an absolute instant. Ambiguous
/// local times (DST fall-back) resolve to the earlier occurrence; times in
/// a DST gap yield `None`.
pub fn local_instant(zone: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Start of the local calendar day in `zone`, as an absolute instant.
/// Falls forward hour by hour for zones whose DST gap swallows midnight.
pub fn start_of_local_day(zone: Tz, date: NaiveDate) -> DateTime<Utc> {
    for hour in 0..3 {
        if let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0)
            && let Some(instant) = local_instant(zone, date, time)
        {
            return instant;
        }
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Atomically-swappable handle to the currently-cached timetable.
///
/// Cloning the handle is cheap; every clone observes the same underlying
/// slot. `load` takes a snapshot reference, so a reader that is mid-query
/// while a refresh lands keeps operating on the timetable it started with.
#[derive(Debug, Clone)]
pub struct SharedTimetable {
    inner: Arc<RwLock<Arc<Timetable>>>,
}

impl SharedTimetable {
    pub fn new(timetable: Timetable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(timetable))),
        }
    }

    /// Snapshot the current timetable.
    pub fn load(&self) -> Arc<Timetable> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid reference; keep serving it.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole timetable reference. Readers observe either the
    /// old or the new timetable, never a mix.
    pub fn store(&self, timetable: Timetable) {
        let fresh = Arc::new(timetable);
        match self.inner.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }
}
