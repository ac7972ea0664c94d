//! Shared constants: event labels, configuration defaults, validation bounds.

/// Process exit code for fatal startup and runtime errors.
pub const EXIT_FAILURE: i32 = 1;

/// Event name the timetable uses for sunrise. The post-sunrise interval is
/// the only one the state engine subdivides (Duha, then Zawaal).
pub const SUNRISE_LABEL: &str = "Sunrise";

/// Synthetic mid-morning state between sunrise and the Zawaal cut-off.
pub const DUHA_LABEL: &str = "Duha";

/// Synthetic cut-off state covering the last minutes before Zuhr.
pub const ZAWAAL_LABEL: &str = "Zawaal";

/// Evening event that starts the Islamic day under the at-maghrib policy.
pub const MAGHRIB_LABEL: &str = "Maghrib Begins";

/// The two afternoon Asr columns; the configured method decides which one
/// is tracked.
pub const ASR_MITHL_1_LABEL: &str = "Asr Mithl 1";
pub const ASR_MITHL_2_LABEL: &str = "Asr Mithl 2";

/// Ordered daily cycle tracked by default.
pub const DEFAULT_TRACKED_EVENTS: &[&str] = &[
    "Fajr Begins",
    "Sunrise",
    "Zuhr Begins",
    "Asr Mithl 1",
    "Maghrib Begins",
    "Ishā Begins",
];

/// Substrings stripped from raw event names for display
/// ("Zuhr Begins" -> "Zuhr", "Asr Mithl 1" -> "Asr").
pub const DEFAULT_REPLACE_STRINGS: &[&str] = &[" Begins", " Mithl 1", " Mithl 2"];

/// Timetable rows are wall-clock times in this zone unless configured.
pub const DEFAULT_TIMEZONE: &str = "Europe/London";

/// Width of the Zawaal window before the next raw event, in minutes.
pub const DEFAULT_ZAWAAL_MINS: u64 = 10;
pub const MINIMUM_ZAWAAL_MINS: u64 = 1;
pub const MAXIMUM_ZAWAAL_MINS: u64 = 120;

/// Daily refresh fires this long after the next local midnight.
pub const REFRESH_OFFSET_MINS: i64 = 15;

/// Idle wait for the wake-up scheduler thread when no task is queued.
pub const SCHEDULER_IDLE_WAIT_SECS: u64 = 60;

/// Longest single wait before the scheduler re-derives the due time from
/// the clock. Bounds drift after suspend/resume or clock adjustments.
pub const SCHEDULER_MAX_WAIT_SECS: u64 = 300;
