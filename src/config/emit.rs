use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// What the ticker does when the dispatch channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the dispatcher; undelivered events stay pending meanwhile
    #[default]
    Block,
    /// Drop the event that did not fit
    DropNewest,
}

/// Emit queue settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmitConfig {
    /// Ticker period: how often due events are released to the dispatcher.
    /// Worst-case delivery latency is roughly `scheduled time + interval`.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Capacity of the channel between ticker and dispatcher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Upper bound of events waiting for their scheduled time.
    /// Once reached, the oldest pending event is dropped.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            channel_capacity: default_channel_capacity(),
            max_pending: default_max_pending(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl EmitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "emit.interval_ms must be greater than 0".into(),
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "emit.channel_capacity must be greater than 0".into(),
            )));
        }
        if self.max_pending == 0 {
            return Err(Error::Config(ConfigError::Message(
                "emit.max_pending must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    5_000
}
fn default_channel_capacity() -> usize {
    128
}
fn default_max_pending() -> usize {
    10_000
}
