//! Shared builders and fakes for unit tests.
//!
//! Managers are built over the in-memory engine with short debounce windows
//! so TTL behaviour can be observed with real sleeps of a few dozen
//! milliseconds.

mod common;
mod manager_builder;

pub use common::*;
pub use manager_builder::*;
