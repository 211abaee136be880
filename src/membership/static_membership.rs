use parking_lot::RwLock;
use tracing::debug;

use super::MembershipProvider;
use crate::Result;

/// Membership held in memory and replaced wholesale by its owner.
///
/// Used when the platform client pushes membership changes instead of
/// being polled, and in tests.
#[derive(Debug, Default)]
pub struct StaticMembership {
    groups: RwLock<Vec<i64>>,
}

impl StaticMembership {
    pub fn new(groups: Vec<i64>) -> Self {
        Self {
            groups: RwLock::new(groups),
        }
    }

    pub fn set_groups(
        &self,
        groups: Vec<i64>,
    ) {
        debug!(?groups, "replace group list");
        *self.groups.write() = groups;
    }
}

impl MembershipProvider for StaticMembership {
    fn reload(&self) -> Result<()> {
        Ok(())
    }

    fn group_codes(&self) -> Vec<i64> {
        self.groups.read().clone()
    }
}
