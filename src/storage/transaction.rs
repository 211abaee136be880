//! Scoped read-only and read-write transactions over a [`KvEngine`].
//!
//! - One write transaction runs at a time process-wide.
//! - Writes are staged in an overlay that the same transaction reads back,
//!   and reach the engine as one atomic batch on commit.
//! - Read transactions hold a shared gate that commits take exclusively, so
//!   a reader never observes half of a commit.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::record::StoredValue;
use super::KvEngine;
use super::WriteBatch;
use crate::keys::KEY_WILDCARD;
use crate::time::now_millis;
use crate::Result;
use crate::StorageError;

/// Outcome chosen by a write-transaction body.
///
/// `Rollback` discards every staged write and still hands the value back
/// to the caller; errors returned by the body also discard everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDecision<R> {
    Commit(R),
    Rollback(R),
}

pub struct TransactionStore {
    engine: Arc<dyn KvEngine>,

    /// Single-writer lock
    writer: Mutex<()>,

    /// Shared by readers, exclusive while a commit is applied
    gate: RwLock<()>,

    /// index name -> key prefix
    indexes: RwLock<BTreeMap<String, String>>,
}

impl std::fmt::Debug for TransactionStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TransactionStore")
            .field("len", &self.engine.len())
            .field("indexes", &self.indexes.read().len())
            .finish()
    }
}

impl TransactionStore {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            engine,
            writer: Mutex::new(()),
            gate: RwLock::new(()),
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Runs `f` against a consistent read-only view.
    pub fn read_tx<R>(
        &self,
        f: impl FnOnce(&ReadTx<'_>) -> Result<R>,
    ) -> Result<R> {
        let _gate = self.gate.read();
        let tx = ReadTx {
            store: self,
            now_ms: now_millis(),
        };
        f(&tx)
    }

    /// Runs `f` inside the single write transaction slot.
    ///
    /// Staged writes are applied when `f` returns `Ok(TxDecision::Commit)`,
    /// and dropped on `Ok(TxDecision::Rollback)` or `Err`.
    pub fn write_tx<R>(
        &self,
        f: impl FnOnce(&mut WriteTx<'_>) -> Result<TxDecision<R>>,
    ) -> Result<R> {
        let _writer = self.writer.lock();
        let mut tx = WriteTx {
            store: self,
            overlay: BTreeMap::new(),
            now_ms: now_millis(),
        };
        match f(&mut tx)? {
            TxDecision::Commit(r) => {
                let batch = tx.into_batch()?;
                if !batch.is_empty() {
                    trace!(ops = batch.len(), "commit");
                    let _gate = self.gate.write();
                    self.engine.apply_batch(batch)?;
                }
                Ok(r)
            }
            TxDecision::Rollback(r) => {
                trace!(ops = tx.overlay.len(), "rollback");
                Ok(r)
            }
        }
    }

    /// Registers (or re-points) an index. `pattern` is a key prefix followed
    /// by `*`. Returns true if the registry changed.
    pub fn create_index(
        &self,
        name: &str,
        pattern: &str,
    ) -> bool {
        let prefix = pattern.strip_suffix(KEY_WILDCARD).unwrap_or(pattern).to_string();
        let mut indexes = self.indexes.write();
        match indexes.get(name) {
            Some(existing) if *existing == prefix => false,
            _ => {
                debug!(%name, %pattern, "create index");
                indexes.insert(name.to_string(), prefix);
                true
            }
        }
    }

    pub fn drop_index(
        &self,
        name: &str,
    ) -> bool {
        let dropped = self.indexes.write().remove(name).is_some();
        if dropped {
            debug!(%name, "drop index");
        }
        dropped
    }

    pub fn has_index(
        &self,
        name: &str,
    ) -> bool {
        self.indexes.read().contains_key(name)
    }

    /// Names of all registered indexes, sorted.
    pub fn indexes(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Deletes every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let _writer = self.writer.lock();
        let now_ms = now_millis();
        let mut batch = WriteBatch::default();
        for (key, value) in self.engine.scan_prefix(&[])? {
            if StoredValue::decode(&value)?.is_expired(now_ms) {
                batch.delete(key);
            }
        }
        let purged = batch.len();
        if purged > 0 {
            let _gate = self.gate.write();
            self.engine.apply_batch(batch)?;
            debug!(purged, "purged expired records");
        }
        Ok(purged)
    }

    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }

    fn index_prefix(
        &self,
        index: &str,
    ) -> Result<String> {
        self.indexes
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| StorageError::IndexNotFound(index.to_string()).into())
    }

    fn engine_get(
        &self,
        key: &str,
    ) -> Result<Option<StoredValue>> {
        match self.engine.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(StoredValue::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn engine_scan(
        &self,
        prefix: &str,
    ) -> Result<BTreeMap<String, StoredValue>> {
        let mut result = BTreeMap::new();
        for (key, value) in self.engine.scan_prefix(prefix.as_bytes())? {
            let key = String::from_utf8(key)
                .map_err(|e| StorageError::DbError(format!("non utf-8 key: {e}")))?;
            result.insert(key, StoredValue::decode(&value)?);
        }
        Ok(result)
    }
}

/// Read-only transaction handle.
pub struct ReadTx<'a> {
    store: &'a TransactionStore,
    now_ms: u64,
}

impl ReadTx<'_> {
    /// Live value under `key`; expired and missing records both read `None`.
    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        Ok(self.store.engine_get(key)?.and_then(|v| v.live(self.now_ms)))
    }

    /// Visits live entries of `index` in ascending key order until `f`
    /// returns false.
    pub fn ascend(
        &self,
        index: &str,
        mut f: impl FnMut(&str, &str) -> bool,
    ) -> Result<()> {
        let prefix = self.store.index_prefix(index)?;
        for (key, value) in self.store.engine_scan(&prefix)? {
            if value.is_expired(self.now_ms) {
                continue;
            }
            if !f(&key, &value.value) {
                break;
            }
        }
        Ok(())
    }
}

/// Read-write transaction handle.
pub struct WriteTx<'a> {
    store: &'a TransactionStore,
    /// Staged writes: `None` marks a delete
    overlay: BTreeMap<String, Option<StoredValue>>,
    now_ms: u64,
}

impl WriteTx<'_> {
    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        let stored = match self.overlay.get(key) {
            Some(staged) => staged.clone(),
            None => self.store.engine_get(key)?,
        };
        Ok(stored.and_then(|v| v.live(self.now_ms)))
    }

    /// Stages `value` under `key`, optionally expiring after `ttl`.
    /// Returns the previous live value.
    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Result<Option<String>> {
        let previous = self.get(key)?;
        self.overlay
            .insert(key.to_string(), Some(StoredValue::new(value.into(), ttl, self.now_ms)));
        Ok(previous)
    }

    /// Stages removal of `key`. Returns the previous live value.
    pub fn delete(
        &mut self,
        key: &str,
    ) -> Result<Option<String>> {
        let previous = self.get(key)?;
        self.overlay.insert(key.to_string(), None);
        Ok(previous)
    }

    /// Like [`ReadTx::ascend`], with this transaction's staged writes applied.
    pub fn ascend(
        &self,
        index: &str,
        mut f: impl FnMut(&str, &str) -> bool,
    ) -> Result<()> {
        let prefix = self.store.index_prefix(index)?;
        let mut merged = self.store.engine_scan(&prefix)?;
        let staged = self
            .overlay
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix));
        for (key, value) in staged {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        for (key, value) in merged {
            if value.is_expired(self.now_ms) {
                continue;
            }
            if !f(&key, &value.value) {
                break;
            }
        }
        Ok(())
    }

    fn into_batch(self) -> Result<WriteBatch> {
        let mut batch = WriteBatch::default();
        for (key, value) in self.overlay {
            match value {
                Some(v) => batch.put(key.into_bytes(), v.encode()?),
                None => batch.delete(key.into_bytes()),
            }
        }
        Ok(batch)
    }
}
