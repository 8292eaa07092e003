use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DEFAULT_QUEUE_CAPACITY;
use crate::source::timestamp::{
    local_utc_offset, parse_start_time, parse_utc_offset, TimestampError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Event-log export to poll
    pub path: PathBuf,
    /// Time between polls
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Records at or before this time are never forwarded, `%Y-%m-%d %H:%M:%S`
    pub start_time: String,
    /// Zone of the export's wall-clock times, e.g. `+08:00`. Local zone if unset.
    #[serde(default)]
    pub utc_offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    #[serde(default = "default_cursor_path")]
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            path: default_cursor_path(),
        }
    }
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from(".pos.dat")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub push_url: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(with = "humantime_serde")]
    pub batch_wait: Duration,
    pub batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Stamp records with their own (rebased) time instead of the send time
    #[serde(default)]
    pub push_origin_ts: bool,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory for `logtap.log`; logs go to stderr when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SourceConfig {
    pub fn start_time(&self) -> Result<DateTime<Utc>, TimestampError> {
        parse_start_time(&self.start_time)
    }

    /// Configured offset, or the host's local offset when none is set.
    pub fn utc_offset(&self) -> Result<FixedOffset, TimestampError> {
        match &self.utc_offset {
            Some(offset) => parse_utc_offset(offset),
            None => Ok(local_utc_offset()),
        }
    }
}
