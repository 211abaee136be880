//! Subscription bookkeeping for one platform.
//!
//! Records kept per platform key space:
//! - concern state `(group, id) -> ConcernType`, never stored empty
//! - concern config `(group, id) -> GroupConcernConfig`
//! - at-all mark `(group, id)`, presence with TTL
//! - fresh mark `id`, presence with TTL

mod state_manager;
pub use state_manager::*;

#[cfg(test)]
mod state_manager_test;
