use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;
use tracing::trace;

use crate::constants::STATUS_NAMESPACE;
use crate::keys::pattern;
use crate::keys::KEY_SEPARATOR;
use crate::Error;
use crate::Result;
use crate::StateManager;
use crate::SubjectId;
use crate::TxDecision;

/// Per-subject JSON snapshot of `T` kept next to the concern records of a
/// [`StateManager`], under `{platform-}current-status:{id}`.
///
/// Snapshots expire after `state.status_ttl_ms`.
pub struct StatusStore<T> {
    manager: Arc<StateManager>,
    namespace: String,
    ttl: Duration,
    _status: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for StatusStore<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StatusStore")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<T> StatusStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(manager: Arc<StateManager>) -> Self {
        let namespace = manager.keys().extra_namespace(STATUS_NAMESPACE);
        let ttl = manager.config().state.status_ttl();
        Self {
            manager,
            namespace,
            ttl,
            _status: PhantomData,
        }
    }

    pub fn manager(&self) -> &Arc<StateManager> {
        &self.manager
    }

    pub fn status_key(
        &self,
        id: &SubjectId,
    ) -> String {
        format!("{}{KEY_SEPARATOR}{id}", self.namespace)
    }

    /// Last stored snapshot of `id`, `None` if missing or expired.
    pub fn get_status(
        &self,
        id: &SubjectId,
    ) -> Result<Option<T>> {
        self.manager.check_subject(id)?;
        let key = self.status_key(id);
        let Some(value) = self.manager.store().read_tx(|tx| tx.get(&key))? else {
            return Ok(None);
        };
        match serde_json::from_str(&value) {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                error!(%id, %value, "corrupt status record: {:?}", e);
                Err(e.into())
            }
        }
    }

    /// Replaces the snapshot of `id` and restarts its TTL.
    pub fn put_status(
        &self,
        id: &SubjectId,
        status: &T,
    ) -> Result<()> {
        self.manager.check_subject(id)?;
        let key = self.status_key(id);
        let value = serde_json::to_string(status)?;
        let ttl = self.ttl;
        self.manager.store().write_tx(|tx| {
            tx.set(&key, value, Some(ttl))?;
            Ok(TxDecision::Commit(()))
        })?;
        trace!(%id, "status updated");
        Ok(())
    }

    /// Removes the snapshot of `id`. Returns whether one existed.
    pub fn delete_status(
        &self,
        id: &SubjectId,
    ) -> Result<bool> {
        self.manager.check_subject(id)?;
        let key = self.status_key(id);
        self.manager
            .store()
            .write_tx(|tx| Ok(TxDecision::Commit(tx.delete(&key)?.is_some())))
    }

    /// Every live snapshot in key order. Requires [`Self::start`].
    pub fn list_status(&self) -> Result<Vec<(SubjectId, T)>> {
        let kind = self.manager.keys().subject_kind();
        self.manager.store().read_tx(|tx| {
            let mut result = Vec::new();
            let mut failure: Option<Error> = None;
            tx.ascend(&self.namespace, |key, value| {
                let parsed = key
                    .strip_prefix(self.namespace.as_str())
                    .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
                    .ok_or_else(|| Error::invalid_key(key))
                    .and_then(|raw| SubjectId::parse(kind, raw))
                    .and_then(|id| Ok((id, serde_json::from_str::<T>(value)?)));
                match parsed {
                    Ok(entry) => {
                        result.push(entry);
                        true
                    }
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                }
            })?;
            match failure {
                Some(e) => Err(e),
                None => Ok(result),
            }
        })
    }

    /// Registers the status index, then starts the underlying manager.
    pub fn start(&self) -> Result<()> {
        self.manager
            .store()
            .create_index(&self.namespace, &pattern(&self.namespace));
        self.manager.start()
    }
}
