use std::sync::Arc;

use super::short_ttl_config;
use crate::mem_store;
use crate::ConcernConfig;
use crate::KeySet;
use crate::KeySpace;
use crate::MembershipProvider;
use crate::StateManager;
use crate::StaticMembership;
use crate::SubjectKind;
use crate::TransactionStore;

/// Builds a [`StateManager`] with in-memory defaults for every collaborator
/// not set explicitly.
pub struct ManagerBuilder {
    store: Option<Arc<TransactionStore>>,
    keys: Option<Arc<dyn KeySpace>>,
    membership: Option<Arc<dyn MembershipProvider>>,
    config: Option<ConcernConfig>,
    use_emit: bool,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            keys: None,
            membership: None,
            config: None,
            use_emit: false,
        }
    }

    pub fn with_store(
        mut self,
        store: Arc<TransactionStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_keys(
        mut self,
        keys: impl KeySpace,
    ) -> Self {
        self.keys = Some(Arc::new(keys));
        self
    }

    pub fn with_membership(
        mut self,
        membership: Arc<dyn MembershipProvider>,
    ) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_config(
        mut self,
        config: ConcernConfig,
    ) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_emit(mut self) -> Self {
        self.use_emit = true;
        self
    }

    pub fn build(self) -> StateManager {
        StateManager::new(
            self.store.unwrap_or_else(mem_store),
            self.keys.unwrap_or_else(|| Arc::new(KeySet::new(SubjectKind::Numeric))),
            self.membership
                .unwrap_or_else(|| Arc::new(StaticMembership::default())),
            &self.config.unwrap_or_else(short_ttl_config),
            self.use_emit,
        )
    }
}

/// Numeric manager over a fresh in-memory store, without emission.
pub fn mem_manager() -> StateManager {
    ManagerBuilder::new().build()
}
