use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::time::deadline_millis;
use crate::Result;

/// On-disk envelope of every value.
///
/// `expire_at_ms` is a wall-clock deadline; once passed the record is
/// invisible to reads and scans even before it is purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredValue {
    pub(crate) value: String,
    pub(crate) expire_at_ms: Option<u64>,
}

impl StoredValue {
    pub(crate) fn new(
        value: String,
        ttl: Option<Duration>,
        now_ms: u64,
    ) -> Self {
        Self {
            value,
            expire_at_ms: ttl.map(|ttl| deadline_millis(now_ms, ttl)),
        }
    }

    pub(crate) fn is_expired(
        &self,
        now_ms: u64,
    ) -> bool {
        matches!(self.expire_at_ms, Some(deadline) if deadline <= now_ms)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Live value, `None` once expired.
    pub(crate) fn live(
        self,
        now_ms: u64,
    ) -> Option<String> {
        if self.is_expired(now_ms) {
            None
        } else {
            Some(self.value)
        }
    }
}
