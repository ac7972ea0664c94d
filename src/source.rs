//! Timetable acquisition: the collaborator contract for fetching and
//! caching, plus the JSON document implementation used by the daemon.
//!
//! The core never parses the publisher's raw per-day rows itself; it only
//! consumes an already-built `Timetable`. `TimetableSource` is the seam:
//! embedders can plug in any acquisition strategy (scraper, API client,
//! test fake) and the refresh scheduler stays unchanged.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::timetable::Timetable;

/// Acquisition contract consumed by the refresh scheduler.
pub trait TimetableSource: Send + Sync {
    /// Fetch and build a fresh timetable from the remote source.
    fn fetch(&self) -> Result<Timetable>;

    /// Load the last-known-good cached timetable.
    fn load_cached(&self) -> Result<Timetable>;

    /// Persist a freshly fetched timetable as the new last-known-good copy.
    /// Failures here are non-fatal; the refresh keeps the in-memory copy.
    fn store_cached(&self, timetable: &Timetable) -> Result<()>;
}

/// Fetches a serialized `Timetable` JSON document over HTTP and caches it
/// on disk.
pub struct JsonTimetableSource {
    url: String,
    cache_path: PathBuf,
}

impl JsonTimetableSource {
    pub fn new(url: impl Into<String>, cache_path: PathBuf) -> Self {
        Self {
            url: url.into(),
            cache_path,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .url
            .clone()
            .context("config is missing the timetable url")?;
        Ok(Self::new(url, config.cache_path()?))
    }
}

impl TimetableSource for JsonTimetableSource {
    fn fetch(&self) -> Result<Timetable> {
        let timetable: Timetable = ureq::get(&self.url)
            .call()
            .with_context(|| format!("failed to fetch timetable from {}", self.url))?
            .body_mut()
            .read_json()
            .with_context(|| format!("failed to parse timetable document from {}", self.url))?;
        Ok(timetable)
    }

    fn load_cached(&self) -> Result<Timetable> {
        let contents = fs::read_to_string(&self.cache_path).with_context(|| {
            format!("failed to read cached timetable: {}", self.cache_path.display())
        })?;
        let timetable = serde_json::from_str(&contents).with_context(|| {
            format!("failed to parse cached timetable: {}", self.cache_path.display())
        })?;
        Ok(timetable)
    }

    fn store_cached(&self, timetable: &Timetable) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache directory: {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string(timetable).context("failed to serialize timetable")?;
        fs::write(&self.cache_path, contents).with_context(|| {
            format!("failed to write cached timetable: {}", self.cache_path.display())
        })?;
        Ok(())
    }
}
