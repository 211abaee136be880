use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Embedded sled database settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// Background flush period; `None` leaves flushing to explicit calls
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,

    /// Open a throwaway database that is removed on drop
    #[serde(default)]
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            flush_every_ms: default_flush_every_ms(),
            temporary: false,
        }
    }
}

impl StorageConfig {
    pub(super) fn validate(&self) -> Result<()> {
        if !self.temporary && self.db_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage.db_path must be set unless storage.temporary is enabled".into(),
            )));
        }
        if self.flush_every_ms == Some(0) {
            return Err(Error::Config(ConfigError::Message(
                "storage.flush_every_ms cannot be 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/concern")
}
fn default_cache_capacity_bytes() -> u64 {
    10 * 1024 * 1024 //10MB
}
fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}
