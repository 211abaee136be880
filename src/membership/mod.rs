//! Read-only view of the groups the bot currently belongs to.

mod static_membership;
pub use static_membership::*;


#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Source of the authoritative group list, supplied by the messaging
/// platform client. Nothing is ever written back through it.
#[cfg_attr(test, automock)]
pub trait MembershipProvider: Send + Sync + 'static {
    /// Re-fetches membership from the platform.
    fn reload(&self) -> Result<()>;

    /// Codes of the groups the bot is currently in.
    fn group_codes(&self) -> Vec<i64>;
}
