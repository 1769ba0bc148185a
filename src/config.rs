//! Table configuration, loaded from JSON or built from defaults.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::sync::think::Think;

/// Missing fields fall back to [`TableConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Seats around the ring, at least 2
    pub philosophers: usize,

    pub think: Think,

    /// How long a philosopher keeps both forks per meal (milliseconds)
    pub eat_ms: u64,

    /// How long to wait for each philosopher to leave once stopped (milliseconds)
    pub join_timeout_ms: u64,

    /// Period of the starvation check (milliseconds)
    pub observe_interval_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            philosophers: 5,
            think: Think::default(),
            eat_ms: 0,
            join_timeout_ms: 3_000,
            observe_interval_ms: 2_000,
        }
    }
}

impl TableConfig {
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn eat(&self) -> Duration {
        Duration::from_millis(self.eat_ms)
    }
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
    pub fn observe_interval(&self) -> Duration {
        Duration::from_millis(self.observe_interval_ms)
    }
}
