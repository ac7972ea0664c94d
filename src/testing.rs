//! Fixture builders shared by unit, integration, and property tests.
//!
//! Only compiled for tests or with the `testing-support` feature enabled
//! (the crate dev-depends on itself with that feature, so `tests/` files
//! can use these too).

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::time_source::TimeSource;
use crate::timetable::{DayRow, Timetable};

/// Clock that tracks real time plus an adjustable offset, so tests can
/// jump a scheduler's clock forward or backward mid-run.
#[derive(Default)]
pub struct ShiftedTimeSource {
    offset_millis: AtomicI64,
}

impl ShiftedTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock by `delta`. Negative values jump it backward.
    pub fn shift(&self, delta: Duration) {
        self.offset_millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl TimeSource for ShiftedTimeSource {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now() + Duration::milliseconds(self.offset_millis.load(Ordering::SeqCst))
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Shorthand UTC constructor for test vectors.
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid test time")
}

fn row(islamic_day: u32, times: &[(&str, (u32, u32))]) -> DayRow {
    DayRow {
        islamic_year: 1443,
        islamic_month: "Safar".to_string(),
        islamic_day,
        times: times
            .iter()
            .map(|(name, (h, m))| (name.to_string(), time(*h, *m)))
            .collect(),
    }
}

/// Three October 2021 days of London timetable data (BST, UTC+1), matching
/// the published timetable those dates carried. Row times are local; all
/// query vectors in the tests are UTC, one hour earlier.
pub fn three_day_timetable() -> Timetable {
    let mut rows = BTreeMap::new();
    rows.insert(
        NaiveDate::from_ymd_opt(2021, 10, 1).expect("valid date"),
        row(
            24,
            &[
                ("Fajr Begins", (5, 30)),
                ("Sunrise", (6, 58)),
                ("Zuhr Begins", (12, 55)),
                ("Asr Mithl 1", (15, 56)),
                ("Asr Mithl 2", (16, 43)),
                ("Maghrib Begins", (18, 41)),
                ("Ishā Begins", (19, 59)),
            ],
        ),
    );
    rows.insert(
        NaiveDate::from_ymd_opt(2021, 10, 2).expect("valid date"),
        row(
            25,
            &[
                ("Fajr Begins", (5, 32)),
                ("Sunrise", (7, 0)),
                ("Zuhr Begins", (12, 55)),
                ("Asr Mithl 1", (15, 54)),
                ("Asr Mithl 2", (16, 41)),
                ("Maghrib Begins", (18, 39)),
                ("Ishā Begins", (19, 57)),
            ],
        ),
    );
    rows.insert(
        NaiveDate::from_ymd_opt(2021, 10, 3).expect("valid date"),
        row(
            26,
            &[
                ("Fajr Begins", (5, 34)),
                ("Sunrise", (7, 2)),
                ("Zuhr Begins", (12, 54)),
                ("Asr Mithl 1", (15, 53)),
                ("Asr Mithl 2", (16, 39)),
                ("Maghrib Begins", (18, 36)),
                ("Ishā Begins", (19, 55)),
            ],
        ),
    );

    Timetable::new(
        "test",
        chrono_tz::Europe::London,
        utc(2021, 10, 1, 0, 0),
        rows,
    )
    .expect("fixture timetable builds")
}

/// Build a timetable whose events repeat daily around the given instants.
///
/// Each `(event, instant)` pair is placed on the instant's UTC date, and the
/// same wall-clock times are replicated onto the neighbouring dates so that
/// now-and-next queries near midnight always have a previous and a next
/// occurrence to land on. Used by the live scheduler/tracker tests, which
/// need events a few hundred milliseconds around the real clock.
pub fn daily_timetable_around(events: &[(&str, DateTime<Utc>)]) -> Timetable {
    let zone: Tz = chrono_tz::UTC;
    let base = events
        .first()
        .map(|(_, instant)| instant.date_naive())
        .expect("at least one event");

    let times: HashMap<String, NaiveTime> = events
        .iter()
        .map(|(name, instant)| (name.to_string(), instant.time()))
        .collect();

    let mut rows = BTreeMap::new();
    for offset in -1..=1i64 {
        rows.insert(
            base + Duration::days(offset),
            DayRow {
                islamic_year: 1443,
                islamic_month: "Safar".to_string(),
                islamic_day: 25,
                times: times.clone(),
            },
        );
    }

    Timetable::new("test", zone, Utc::now(), rows).expect("fixture timetable builds")
}
