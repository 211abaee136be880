//! Persistent subscription state for chat bots that watch external
//! subjects (streamers, channels) on behalf of groups.
//!
//! A [`StateManager`] records which group follows which subject for which
//! [`ConcernType`] categories, keeps TTL debounce marks, and pushes first-time
//! subscriptions through a delayed [`EmitQueue`] to a caller supplied
//! [`Fresher`].

mod concern;
mod constants;
mod emit;
mod errors;
mod keys;
mod manager;
mod membership;
mod metrics;
mod status;
mod storage;
pub mod utils;

// A local `config` module would be ambiguous with the `config` crate here.
mod config;
pub use self::config::*;

pub use concern::*;
pub use constants::STATUS_NAMESPACE;
pub use emit::*;
pub use errors::*;
pub use keys::*;
pub use manager::*;
pub use membership::*;
pub use metrics::*;
pub use status::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
