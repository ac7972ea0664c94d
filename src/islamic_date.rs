//! Islamic date engine: reports the Islamic calendar date and the instant
//! at which it next rolls over.
//!
//! Two policies decide the rollover:
//!
//! - **At maghrib**: the Islamic day begins at the evening "Maghrib Begins"
//!   event, so "today" is reported as the Islamic date of the Gregorian day
//!   the *next* Maghrib occurrence falls on, and the rollover instant is
//!   that occurrence itself.
//! - **At midnight**: the Islamic date of the instant's own local Gregorian
//!   day, rolling at the start of the next local calendar day.
//!
//! The (Gregorian -> Islamic) lookup itself is delegated to the timetable.

use chrono::{DateTime, Duration, Utc};

use crate::config::RolloverPolicy;
use crate::constants::MAGHRIB_LABEL;
use crate::timetable::{IslamicDate, Timetable, TimetableError, start_of_local_day};

/// Islamic date snapshot plus the next rollover instant.
#[derive(Debug, Clone, PartialEq)]
pub struct IslamicDateSnapshot {
    pub year: i32,
    pub month: String,
    pub day: u32,
    pub next_rollover: DateTime<Utc>,
}

impl IslamicDateSnapshot {
    /// Composite display form, e.g. "25 Safar 1443".
    pub fn formatted(&self) -> String {
        format!("{} {} {}", self.day, self.month, self.year)
    }
}

/// Compute the Islamic date at `at` under the given rollover policy.
pub fn islamic_date_and_rollover(
    timetable: &Timetable,
    at: DateTime<Utc>,
    policy: RolloverPolicy,
) -> Result<IslamicDateSnapshot, TimetableError> {
    let (gregorian_date, next_rollover) = match policy {
        RolloverPolicy::AtMaghrib => {
            let occurrence = timetable.next_occurrence(MAGHRIB_LABEL, at)?;
            let date = occurrence
                .instant
                .with_timezone(&timetable.timezone)
                .date_naive();
            (date, occurrence.instant)
        }
        RolloverPolicy::AtMidnight => {
            let local_date = at.with_timezone(&timetable.timezone).date_naive();
            let next_day = local_date + Duration::days(1);
            (local_date, start_of_local_day(timetable.timezone, next_day))
        }
    };

    let IslamicDate { year, month, day } = timetable.islamic_date(gregorian_date)?;
    Ok(IslamicDateSnapshot {
        year,
        month,
        day,
        next_rollover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{three_day_timetable, utc};

    #[test]
    fn midnight_policy_reports_the_local_day() {
        let tt = three_day_timetable();
        // 13:00 and 22:00 UTC on Oct 2 are the same local day; the date
        // must not move at Maghrib under this policy.
        let early = islamic_date_and_rollover(&tt, utc(2021, 10, 2, 13, 0), RolloverPolicy::AtMidnight)
            .unwrap();
        let late = islamic_date_and_rollover(&tt, utc(2021, 10, 2, 22, 0), RolloverPolicy::AtMidnight)
            .unwrap();
        assert_eq!(early.day, 25);
        assert_eq!((late.year, late.month.clone(), late.day), (1443, "Safar".into(), 25));

        // Local midnight in BST is 23:00 UTC.
        assert_eq!(early.next_rollover, utc(2021, 10, 2, 23, 0));
        assert_eq!(late.next_rollover, utc(2021, 10, 2, 23, 0));
    }

    #[test]
    fn midnight_policy_rolls_exactly_at_local_midnight() {
        let tt = three_day_timetable();
        let just_before = islamic_date_and_rollover(
            &tt,
            utc(2021, 10, 2, 22, 59),
            RolloverPolicy::AtMidnight,
        )
        .unwrap();
        let just_after = islamic_date_and_rollover(
            &tt,
            utc(2021, 10, 2, 23, 0),
            RolloverPolicy::AtMidnight,
        )
        .unwrap();
        assert_eq!(just_before.day, 25);
        assert_eq!(just_after.day, 26);
    }

    #[test]
    fn maghrib_policy_rolls_at_the_maghrib_instant() {
        let tt = three_day_timetable();
        // Maghrib on Oct 2 is 18:39 local = 17:39 UTC. Before it the next
        // occurrence is today's, so today's Islamic date is reported.
        let before = islamic_date_and_rollover(&tt, utc(2021, 10, 2, 13, 0), RolloverPolicy::AtMaghrib)
            .unwrap();
        assert_eq!(before.day, 25);
        assert_eq!(before.next_rollover, utc(2021, 10, 2, 17, 39));

        // From the Maghrib instant onward the next occurrence is
        // tomorrow's, and the reported date advances with it.
        let after = islamic_date_and_rollover(&tt, utc(2021, 10, 2, 17, 39), RolloverPolicy::AtMaghrib)
            .unwrap();
        assert_eq!(after.day, 26);
        assert_eq!(after.next_rollover, utc(2021, 10, 3, 17, 36));
    }

    #[test]
    fn formatted_composite_date() {
        let tt = three_day_timetable();
        let snap = islamic_date_and_rollover(&tt, utc(2021, 10, 2, 13, 0), RolloverPolicy::AtMidnight)
            .unwrap();
        assert_eq!(snap.formatted(), "25 Safar 1443");
    }
}
