//! Platform extension records: the last known status of each subject.

mod status_store;
pub use status_store::*;
