//! Configuration system for luptr with validation and default generation.
//!
//! Handles the TOML configuration file, default value generation, and the
//! derived interpretation policies (Asr method, Islamic-date rollover) that
//! change which timetable column is authoritative.
//!
//! ## Configuration Structure
//!
//! ```toml
//! #[Timetable source]
//! url = "https://example.org/timetable.json"  # Remote timetable document
//! timezone = "Europe/London"                  # Zone of the row times
//!
//! #[Interpretation policies]
//! zawaal_mins = 10                 # Zawaal window before Zuhr (1-120 minutes)
//! islamic_date_at_maghrib = false  # Roll the Islamic date at Maghrib instead of midnight
//! use_asr_mithl_2 = false          # Track "Asr Mithl 2" instead of "Asr Mithl 1"
//! ```
//!
//! The tracked-event cycle and the display rewrite table can also be
//! overridden (`prayers`, `replace_strings`); the defaults follow the
//! unified timetable's column names.
//!
//! ## Lifecycle
//!
//! Constructed once at startup from defaults overridden by the file's
//! values, then immutable for the session. A timetable refresh replaces the
//! timetable, never the configuration.

use anyhow::{Context, Result};
use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;

#[cfg(test)]
mod tests;

/// Which afternoon column is tracked as Asr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrMethod {
    Mithl1,
    Mithl2,
}

/// When the reported Islamic calendar date advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverPolicy {
    /// At the start of the next local calendar day.
    AtMidnight,
    /// At the next "Maghrib Begins" instant.
    AtMaghrib,
}

/// Configuration for the luptr tracker and daemon.
///
/// Most fields are optional and fall back to the defaults in
/// [`crate::constants`] when not specified.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Remote timetable document URL. Required for the daemon; library
    /// embedders supplying their own `TimetableSource` may omit it.
    pub url: Option<String>,

    /// Zone the timetable's wall-clock times are expressed in.
    pub timezone: Option<String>,

    /// Width of the Zawaal window before the next raw event, in minutes.
    pub zawaal_mins: Option<u64>,

    /// Roll the Islamic date at Maghrib rather than local midnight.
    pub islamic_date_at_maghrib: Option<bool>,

    /// Track "Asr Mithl 2" instead of "Asr Mithl 1".
    pub use_asr_mithl_2: Option<bool>,

    /// Ordered daily cycle of tracked event names.
    pub prayers: Option<Vec<String>>,

    /// Substrings stripped from raw event names for display.
    pub replace_strings: Option<Vec<String>>,

    /// Where the last-known-good timetable document is cached.
    pub cache_path: Option<String>,
}

impl Config {
    /// Load configuration from the default path, creating a commented
    /// default file on first run.
    pub fn load() -> Result<Self> {
        let path = get_config_path()?;
        if !path.exists() {
            create_default_config(&path)
                .context("failed to create default config during load")?;
        }
        Self::load_from_path(&path)
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn zawaal_window(&self) -> Duration {
        Duration::minutes(self.zawaal_mins.unwrap_or(DEFAULT_ZAWAAL_MINS) as i64)
    }

    pub fn asr_method(&self) -> AsrMethod {
        if self.use_asr_mithl_2.unwrap_or(false) {
            AsrMethod::Mithl2
        } else {
            AsrMethod::Mithl1
        }
    }

    pub fn rollover_policy(&self) -> RolloverPolicy {
        if self.islamic_date_at_maghrib.unwrap_or(false) {
            RolloverPolicy::AtMaghrib
        } else {
            RolloverPolicy::AtMidnight
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{name}': {e}"))
    }

    /// Resolve the cache file path, defaulting under the user cache dir.
    pub fn cache_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cache_path {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::cache_dir().context("could not determine cache directory")?;
        Ok(base.join("luptr").join("timetable.json"))
    }

    /// Display the loaded configuration in the logger's block style.
    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        if let Some(url) = &self.url {
            log_indented!("Timetable URL: {}", url);
        }
        log_indented!(
            "Timezone: {}",
            self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
        );
        log_indented!(
            "Zawaal window: {} minutes",
            self.zawaal_mins.unwrap_or(DEFAULT_ZAWAAL_MINS)
        );
        log_indented!(
            "Islamic date rollover: {}",
            match self.rollover_policy() {
                RolloverPolicy::AtMidnight => "at midnight",
                RolloverPolicy::AtMaghrib => "at maghrib",
            }
        );
        log_indented!(
            "Asr method: {}",
            match self.asr_method() {
                AsrMethod::Mithl1 => "mithl 1",
                AsrMethod::Mithl2 => "mithl 2",
            }
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            timezone: None,
            zawaal_mins: None,
            islamic_date_at_maghrib: None,
            use_asr_mithl_2: None,
            prayers: None,
            replace_strings: None,
            cache_path: None,
        }
    }
}

/// Get the configuration file path: `$XDG_CONFIG_HOME/luptr/luptr.toml`.
pub fn get_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join("luptr").join("luptr.toml"))
}

/// Write a commented default configuration file.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
    }

    let contents = r#"#[Timetable source]
url = "https://www.eastlondonmosque.org.uk/timetable.json"  # Remote timetable document
timezone = "Europe/London"       # Zone of the timetable's wall-clock times

#[Interpretation policies]
zawaal_mins = 10                 # Zawaal window before Zuhr (1-120 minutes)
islamic_date_at_maghrib = false  # Roll the Islamic date at Maghrib instead of midnight
use_asr_mithl_2 = false          # Track "Asr Mithl 2" instead of "Asr Mithl 1"
"#;

    fs::write(path, contents)
        .with_context(|| format!("failed to write default config: {}", path.display()))?;
    log_block_start!("Created default configuration: {}", path.display());
    Ok(())
}

/// Validate ranges and cross-field consistency.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(mins) = config.zawaal_mins
        && !(MINIMUM_ZAWAAL_MINS..=MAXIMUM_ZAWAAL_MINS).contains(&mins)
    {
        anyhow::bail!(
            "zawaal_mins must be between {MINIMUM_ZAWAAL_MINS} and {MAXIMUM_ZAWAAL_MINS}, got {mins}"
        );
    }

    if let Some(prayers) = &config.prayers {
        if prayers.is_empty() {
            anyhow::bail!("prayers must name at least one tracked event");
        }
        let mut seen = std::collections::HashSet::new();
        for prayer in prayers {
            if !seen.insert(prayer) {
                anyhow::bail!("duplicate tracked event '{prayer}' in prayers");
            }
        }
    }

    if let Some(url) = &config.url
        && url.trim().is_empty()
    {
        anyhow::bail!("url must not be empty when set");
    }

    // Surface bad timezone names at load time, not first query
    config.timezone()?;

    Ok(())
}

/// The resolved daily cycle plus its display rewrite table.
///
/// The Asr-method substitution changes the tracked list itself and is
/// applied exactly once, here, when the list is built, not per query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvents {
    events: Vec<String>,
    replace: Vec<String>,
}

impl TrackedEvents {
    pub fn from_config(config: &Config) -> Self {
        let mut events: Vec<String> = config
            .prayers
            .clone()
            .unwrap_or_else(|| DEFAULT_TRACKED_EVENTS.iter().map(|s| s.to_string()).collect());

        if config.asr_method() == AsrMethod::Mithl2 {
            for event in &mut events {
                if event == ASR_MITHL_1_LABEL {
                    *event = ASR_MITHL_2_LABEL.to_string();
                }
            }
        }

        let replace = config
            .replace_strings
            .clone()
            .unwrap_or_else(|| DEFAULT_REPLACE_STRINGS.iter().map(|s| s.to_string()).collect());

        Self { events, replace }
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Rewrite a raw event name for display ("Zuhr Begins" -> "Zuhr").
    pub fn display(&self, raw: &str) -> String {
        let mut name = raw.to_string();
        for pattern in &self.replace {
            name = name.replace(pattern.as_str(), "");
        }
        name
    }

    /// Attribute key carrying the next occurrence of a raw event
    /// ("Zuhr Begins" -> "next_zuhr").
    pub fn attr_key(&self, raw: &str) -> String {
        format!(
            "next_{}",
            self.display(raw).to_lowercase().replace(' ', "_")
        )
    }
}
