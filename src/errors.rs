//! Concern State Error Hierarchy
//!
//! Errors are grouped by layer: storage engine failures, subscription
//! contract violations and configuration problems.

use config::ConfigError;

use crate::SubjectId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying keyed engine failures (I/O, encoding, missing index)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Subscription bookkeeping failures surfaced to callers
    #[error(transparent)]
    Concern(#[from] ConcernError),

    /// Failure reported by an externally supplied fresher callback.
    /// [`crate::Fresher`] implementations build it with [`Error::fresher`].
    #[error("Fresher failed: {0}")]
    Fresher(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConcernError {
    /// No record stored under the key
    #[error("Record not found: {key}")]
    NotFound { key: String },

    /// Every requested category is already subscribed
    #[error("Concern already exists for id {id} (group: {group:?})")]
    AlreadyExists { group: Option<i64>, id: SubjectId },

    /// Parallel id/type arrays disagree in length
    #[error("Length mismatch: {ids} ids but {types} types")]
    LengthMismatch { ids: usize, types: usize },

    /// The manager was built without the emit pipeline
    #[error("Emit queue not enabled")]
    EmissionDisabled,

    /// A stored key does not follow the `namespace:group:subject` layout
    #[error("Invalid key: {key}")]
    InvalidKey { key: String },

    /// A subject id of the wrong kind or with an illegal value
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures while opening or flushing the database
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Embedded sled database errors
    #[error(transparent)]
    Sled(#[from] sled::Error),

    /// Record envelope (de)serialization failures
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// JSON payload (de)serialization failures
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Scan requested over an index that was never created or was dropped
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Generic engine failure with context
    #[error("Embedded database error: {0}")]
    DbError(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(StorageError::Sled(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Storage(StorageError::Bincode(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(StorageError::Json(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(StorageError::Io(e))
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Concern(ConcernError::NotFound { .. }))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Concern(ConcernError::AlreadyExists { .. }))
    }

    pub fn is_index_not_found(&self) -> bool {
        matches!(self, Error::Storage(StorageError::IndexNotFound(_)))
    }

    /// Wraps a platform-side refresh failure.
    pub fn fresher(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Fresher(err.into())
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        ConcernError::NotFound { key: key.into() }.into()
    }

    pub(crate) fn invalid_key(key: impl Into<String>) -> Self {
        ConcernError::InvalidKey { key: key.into() }.into()
    }
}
