//! # luptr Library
//!
//! Internal library for the luptr binary plus the embeddable tracker API.
//!
//! luptr follows a unified prayer timetable: an ordered daily cycle of named
//! events ("Fajr Begins", "Sunrise", "Zuhr Begins", ...). At any instant it
//! knows which period is active, when the next transition happens, and keeps
//! that answer correct by re-arming single-shot wake-ups at each transition.
//!
//! ## Architecture
//!
//! - **Data**: `timetable` holds the query contract (now-and-next, Islamic
//!   date lookup, statistics) and the atomically-swappable shared handle
//! - **Engines**: `state` derives the current prayer state (including the
//!   synthetic Duha/Zawaal states), `islamic_date` derives the Islamic
//!   calendar date under two rollover policies
//! - **Scheduling**: `sched` is a cancellable single-shot wake-up scheduler;
//!   `refresh` replaces the cached timetable once a day with cache fallback
//! - **Host surface**: `tracker` publishes state and attributes through a
//!   `StatePublisher`; `trigger` offers self-re-arming event listeners
//! - **Infrastructure**: hand-rolled logger, TOML configuration, pluggable
//!   time source for simulation in tests

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod config;
pub mod constants;
pub mod islamic_date;
pub mod refresh;
pub mod sched;
pub mod source;
pub mod state;
pub mod time_source;
pub mod timetable;
pub mod tracker;
pub mod trigger;

#[cfg(any(test, feature = "testing-support"))]
pub mod testing;
