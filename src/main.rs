//! Main application entry point and high-level flow coordination.
//!
//! Orchestrates the daemon lifecycle after argument parsing:
//!
//! 1. Configuration loading and validation
//! 2. Initial timetable acquisition (remote fetch, cache fallback)
//! 3. Tracker startup: prayer state and Islamic date engines, both armed
//! 4. Daily timetable refresh scheduling
//! 5. Signal-driven shutdown with wake-up cleanup

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::Path;
use std::sync::Arc;

use luptr::args::{self, CliAction, ParsedArgs};
use luptr::config::Config;
use luptr::refresh::RefreshScheduler;
use luptr::sched::WakeScheduler;
use luptr::source::JsonTimetableSource;
use luptr::constants::EXIT_FAILURE;
use luptr::tracker::{PrayerTracker, StateAttributes, StatePublisher};
use luptr::{log_block_start, log_decorated, log_end, log_error_exit, log_indented, log_version};

/// Publishes state changes to the log. Embedders replace this with a
/// publisher that forwards to their own surface.
struct LoggingPublisher {
    debug_enabled: bool,
}

impl StatePublisher for LoggingPublisher {
    fn publish(&self, state: &str, attributes: &StateAttributes) {
        log_block_start!("State: {} ({})", state, attributes.islamic_date);
        if self.debug_enabled {
            for (key, instant) in &attributes.next_times {
                log_indented!("{}: {}", key, instant.format("%Y-%m-%d %H:%M %Z"));
            }
        }
    }
}

fn main() {
    let parsed_args = ParsedArgs::from_env();

    match parsed_args.action {
        CliAction::ShowVersion => args::display_version_info(),
        CliAction::ShowHelp => args::display_help(),
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run {
            debug_enabled,
            config_dir,
        } => {
            if let Err(e) = run_daemon(debug_enabled, config_dir) {
                // Print the full anyhow chain with a closing corner.
                log_error_exit!("{e:#}");
                std::process::exit(EXIT_FAILURE);
            }
        }
    }
}

fn run_daemon(debug_enabled: bool, config_dir: Option<String>) -> Result<()> {
    log_version!();

    let config = match &config_dir {
        Some(dir) => Config::load_from_path(&Path::new(dir).join("luptr.toml"))?,
        None => Config::load()?,
    };
    config.log_config();

    let timezone = config.timezone()?;
    let source = Arc::new(
        JsonTimetableSource::from_config(&config).context("cannot build timetable source")?,
    );
    let scheduler = Arc::new(WakeScheduler::new());

    let refresh = RefreshScheduler::start(source, Arc::clone(&scheduler), timezone)
        .context("failed to acquire an initial timetable")?;

    let publisher = Arc::new(LoggingPublisher { debug_enabled });
    let tracker = Arc::new(PrayerTracker::new(
        refresh.shared(),
        Arc::clone(&scheduler),
        &config,
        publisher,
    )?);

    let refresh_tracker = Arc::clone(&tracker);
    refresh.run(Box::new(move |_| refresh_tracker.on_timetable_refresh()));

    // Block until SIGINT or SIGTERM.
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        log_block_start!("Received signal {signal}, shutting down luptr...");
    }

    tracker.stop();
    refresh.stop();
    log_decorated!("All wake-ups cancelled");
    log_end!();

    Ok(())
}
