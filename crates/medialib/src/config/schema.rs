use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Defaults to `~/.medialib/data/medialib.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub intervals: IntervalsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

/// Wait timeouts, in seconds, after which each loop runs without a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub worker_secs: u64,
    pub scanner_secs: u64,
    pub janitor_secs: u64,
    pub retention_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            worker_secs: 30,
            scanner_secs: 30,
            janitor_secs: 720,
            retention_secs: 1440,
        }
    }
}

impl IntervalsConfig {
    pub fn worker(&self) -> Duration {
        Duration::from_secs(self.worker_secs)
    }

    pub fn scanner(&self) -> Duration {
        Duration::from_secs(self.scanner_secs)
    }

    pub fn janitor(&self) -> Duration {
        Duration::from_secs(self.janitor_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How far a claimed record's deletion deadline is pushed out.
    pub postpone_secs: u64,
    /// Age after which `done` jobs are purged.
    pub janitor_window_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            postpone_secs: 24 * 60 * 60,
            janitor_window_secs: 60 * 60,
        }
    }
}

impl RetentionConfig {
    /// Saturates at `TimeDelta::MAX` for values validation would reject.
    pub fn postpone(&self) -> chrono::Duration {
        seconds(self.postpone_secs)
    }

    pub fn janitor_window(&self) -> chrono::Duration {
        seconds(self.janitor_window_secs)
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
