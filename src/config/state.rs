use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Debounce windows and record lifetimes
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateConfig {
    /// Minimum gap between two broadcast mentions for one (group, subject)
    #[serde(default = "default_at_all_mark_ttl_ms")]
    pub at_all_mark_ttl_ms: u64,

    /// Window in which a subject is refreshed at most once by the dispatcher
    #[serde(default = "default_fresh_mark_ttl_ms")]
    pub fresh_mark_ttl_ms: u64,

    /// Lifetime of platform status snapshots
    #[serde(default = "default_status_ttl_ms")]
    pub status_ttl_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            at_all_mark_ttl_ms: default_at_all_mark_ttl_ms(),
            fresh_mark_ttl_ms: default_fresh_mark_ttl_ms(),
            status_ttl_ms: default_status_ttl_ms(),
        }
    }
}

impl StateConfig {
    pub fn at_all_mark_ttl(&self) -> Duration {
        Duration::from_millis(self.at_all_mark_ttl_ms)
    }

    pub fn fresh_mark_ttl(&self) -> Duration {
        Duration::from_millis(self.fresh_mark_ttl_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    pub(super) fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("state.at_all_mark_ttl_ms", self.at_all_mark_ttl_ms),
            ("state.fresh_mark_ttl_ms", self.fresh_mark_ttl_ms),
            ("state.status_ttl_ms", self.status_ttl_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{name} must be greater than 0"
                ))));
            }
        }
        Ok(())
    }
}

// 2 hours
fn default_at_all_mark_ttl_ms() -> u64 {
    2 * 60 * 60 * 1000
}
// 1 minute
fn default_fresh_mark_ttl_ms() -> u64 {
    60 * 1000
}
// 7 days
fn default_status_ttl_ms() -> u64 {
    7 * 24 * 60 * 60 * 1000
}
