//! Prayer state engine: maps a timetable and an instant to the current
//! symbolic state and the instant of the next transition.
//!
//! The raw timetable only knows its own events. The engine overlays two
//! interpretation rules on top of the raw now-and-next answer:
//!
//! - The post-sunrise interval is subdivided: up to `next - zawaal_window`
//!   the state is the synthetic "Duha", after that it is "Zawaal". The Duha
//!   case manufactures an extra transition instant (the Zawaal boundary)
//!   that does not exist in the raw timetable; once past the boundary the
//!   raw next event is authoritative again.
//! - Every other raw state is reported under its display-rewritten name.
//!
//! Each invocation also rebuilds the full `next_<event>` table (the next
//! occurrence of every tracked event, independent of which one is currently
//! active), so the published attributes never go stale between refreshes.
//!
//! `current_state_and_next` is a pure function of its inputs: calling it
//! twice with the same timetable and instant yields identical snapshots.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::TrackedEvents;
use crate::constants::{DUHA_LABEL, SUNRISE_LABEL, ZAWAAL_LABEL};
use crate::timetable::{Timetable, TimetableError};

/// Derived, ephemeral snapshot of the prayer state at one instant.
/// Rebuilt on every query, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct PrayerSnapshot {
    /// Display name of the current state (a tracked event's display name,
    /// or the synthetic "Duha"/"Zawaal").
    pub state: String,
    /// Instant at which the state next changes.
    pub next_transition: DateTime<Utc>,
    /// `next_<event>` attribute table: next occurrence of every tracked
    /// event, keyed by display attribute name.
    pub next_times: BTreeMap<String, DateTime<Utc>>,
}

/// Compute the current state and next transition at `at`.
pub fn current_state_and_next(
    timetable: &Timetable,
    tracked: &TrackedEvents,
    at: DateTime<Utc>,
    zawaal_window: Duration,
) -> Result<PrayerSnapshot, TimetableError> {
    let (current, next) = timetable.now_and_next(tracked.events(), at)?;

    let mut next_times = BTreeMap::new();
    for event in tracked.events() {
        let occurrence = timetable.next_occurrence(event, at)?;
        next_times.insert(tracked.attr_key(event), occurrence.instant);
    }

    let (state, next_transition) = if current.event == SUNRISE_LABEL {
        let zawaal_instant = next.instant - zawaal_window;
        if at >= zawaal_instant {
            (ZAWAAL_LABEL.to_string(), next.instant)
        } else {
            (DUHA_LABEL.to_string(), zawaal_instant)
        }
    } else {
        (tracked.display(&current.event), next.instant)
    };

    Ok(PrayerSnapshot {
        state,
        next_transition,
        next_times,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{three_day_timetable, utc};

    fn snapshot_at(at: DateTime<Utc>) -> PrayerSnapshot {
        let tt = three_day_timetable();
        let tracked = TrackedEvents::from_config(&Config::default());
        current_state_and_next(&tt, &tracked, at, Duration::minutes(10)).unwrap()
    }

    #[test]
    fn plain_state_uses_display_name() {
        // 13:00 UTC on Oct 2: Zuhr began 11:55 UTC, Asr at 14:54 UTC.
        let snap = snapshot_at(utc(2021, 10, 2, 13, 0));
        assert_eq!(snap.state, "Zuhr");
        assert_eq!(snap.next_transition, utc(2021, 10, 2, 14, 54));
    }

    #[test]
    fn duha_before_the_zawaal_boundary() {
        // Oct 1: Sunrise 06:58 local, Zuhr 12:55 local. At 11:50 local
        // (10:50 UTC) the state is Duha and the manufactured transition is
        // the Zawaal boundary, 12:45 local.
        let snap = snapshot_at(utc(2021, 10, 1, 10, 50));
        assert_eq!(snap.state, "Duha");
        assert_eq!(snap.next_transition, utc(2021, 10, 1, 11, 45));
    }

    #[test]
    fn zawaal_after_the_boundary() {
        // At 11:55 local the Zawaal window has started; the raw next event
        // (Zuhr, 12:55 local) is the authoritative next transition.
        let snap = snapshot_at(utc(2021, 10, 1, 10, 55));
        assert_eq!(snap.state, "Zawaal");
        assert_eq!(snap.next_transition, utc(2021, 10, 1, 11, 55));
    }

    #[test]
    fn zawaal_boundary_is_inclusive() {
        let snap = snapshot_at(utc(2021, 10, 1, 11, 45));
        assert_eq!(snap.state, "Zawaal");
    }

    #[test]
    fn next_times_cover_every_tracked_event() {
        let snap = snapshot_at(utc(2021, 10, 2, 13, 0));
        assert_eq!(snap.next_times.len(), 6);
        // Zuhr has passed today, so its next occurrence is tomorrow.
        assert_eq!(snap.next_times["next_zuhr"], utc(2021, 10, 3, 11, 54));
        // Maghrib is still ahead today.
        assert_eq!(snap.next_times["next_maghrib"], utc(2021, 10, 2, 17, 39));
        assert!(snap.next_times.contains_key("next_fajr"));
        assert!(snap.next_times.contains_key("next_sunrise"));
        assert!(snap.next_times.contains_key("next_asr"));
        assert!(snap.next_times.contains_key("next_ishā"));
    }

    #[test]
    fn queries_are_idempotent() {
        let at = utc(2021, 10, 2, 10, 30);
        assert_eq!(snapshot_at(at), snapshot_at(at));
    }

    #[test]
    fn asr_method_switch_only_moves_asr() {
        let tt = three_day_timetable();
        let mithl2 = Config {
            use_asr_mithl_2: Some(true),
            ..Config::default()
        };
        let tracked1 = TrackedEvents::from_config(&Config::default());
        let tracked2 = TrackedEvents::from_config(&mithl2);

        let at = utc(2021, 10, 2, 13, 0);
        let snap1 = current_state_and_next(&tt, &tracked1, at, Duration::minutes(10)).unwrap();
        let snap2 = current_state_and_next(&tt, &tracked2, at, Duration::minutes(10)).unwrap();

        // Asr Mithl 2 is 16:41 local on Oct 2 (15:41 UTC) vs Mithl 1's 15:54.
        assert_eq!(snap1.next_times["next_asr"], utc(2021, 10, 2, 14, 54));
        assert_eq!(snap2.next_times["next_asr"], utc(2021, 10, 2, 15, 41));

        // Every non-Asr attribute is identical between the two methods.
        for (key, instant) in &snap1.next_times {
            if key != "next_asr" {
                assert_eq!(snap2.next_times[key], *instant);
            }
        }
        // And the reported next transition moves with the Asr column.
        assert_eq!(snap1.next_transition, utc(2021, 10, 2, 14, 54));
        assert_eq!(snap2.next_transition, utc(2021, 10, 2, 15, 41));
    }

    #[test]
    fn monotonic_re_arm_across_a_day() {
        // Walk the cycle by repeatedly jumping to the reported transition:
        // each recomputed next must be strictly later than the firing
        // instant we just consumed.
        let tt = three_day_timetable();
        let tracked = TrackedEvents::from_config(&Config::default());
        let mut at = utc(2021, 10, 1, 5, 0);
        for _ in 0..10 {
            let snap =
                current_state_and_next(&tt, &tracked, at, Duration::minutes(10)).unwrap();
            assert!(snap.next_transition > at);
            at = snap.next_transition;
        }
    }
}
