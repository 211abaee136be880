use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::keys::pattern;
use crate::keys::KEY_SEPARATOR;
use crate::run_dispatch_loop;
use crate::ConcernConfig;
use crate::ConcernError;
use crate::ConcernType;
use crate::EmitEvent;
use crate::EmitQueue;
use crate::Error;
use crate::FreshGate;
use crate::Fresher;
use crate::GroupConcernConfig;
use crate::KeySpace;
use crate::MembershipProvider;
use crate::Namespace;
use crate::Result;
use crate::SubjectId;
use crate::TransactionStore;
use crate::TxDecision;

/// Value stored under presence-only marks
const MARK_VALUE: &str = "";

/// Parallel result arrays of [`StateManager::list`]: group codes, subject
/// ids and concern types, index-aligned.
pub type ConcernListing = (Vec<i64>, Vec<SubjectId>, Vec<ConcernType>);

/// Owns the subscription records of one platform.
///
/// All reads and writes go through the injected [`TransactionStore`]; keys
/// come from the injected [`KeySpace`]. With emission enabled, first-time
/// subscriptions are pushed through an [`EmitQueue`] to a dispatch loop.
pub struct StateManager {
    store: Arc<TransactionStore>,
    keys: Arc<dyn KeySpace>,
    membership: Arc<dyn MembershipProvider>,
    config: ConcernConfig,

    emit_queue: Option<Arc<EmitQueue>>,
    /// Taken by the single dispatch loop
    emit_rx: Mutex<Option<mpsc::Receiver<EmitEvent>>>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("namespace", &self.keys.namespace(Namespace::ConcernState))
            .field("use_emit", &self.emit_queue.is_some())
            .finish()
    }
}

impl StateManager {
    pub fn new(
        store: Arc<TransactionStore>,
        keys: Arc<dyn KeySpace>,
        membership: Arc<dyn MembershipProvider>,
        config: &ConcernConfig,
        use_emit: bool,
    ) -> Self {
        let (emit_queue, emit_rx) = if use_emit {
            let (queue, rx) = EmitQueue::new(config.emit.clone());
            (Some(Arc::new(queue)), Some(rx))
        } else {
            (None, None)
        };

        let manager = Self {
            store,
            keys,
            membership,
            config: config.clone(),
            emit_queue,
            emit_rx: Mutex::new(emit_rx),
        };
        manager.ensure_global_indexes();
        manager
    }

    pub fn store(&self) -> &Arc<TransactionStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<dyn KeySpace> {
        &self.keys
    }

    pub fn config(&self) -> &ConcernConfig {
        &self.config
    }

    /// Number of events waiting in the emit queue; zero without emission.
    pub fn pending_emits(&self) -> usize {
        self.emit_queue.as_ref().map(|q| q.len()).unwrap_or(0)
    }

    // ---------------------------------------------------------------
    // Group concern config

    /// Never fails: a missing, corrupt or unreadable record yields the
    /// default config.
    pub fn get_group_concern_config(
        &self,
        group: i64,
        id: &SubjectId,
    ) -> GroupConcernConfig {
        if let Err(e) = self.check_subject(id) {
            error!(%group, %id, "get_group_concern_config: {:?}", e);
            return GroupConcernConfig::default();
        }
        let key = self.keys.group_key(Namespace::ConcernConfig, group, id);
        match self.store.read_tx(|tx| tx.get(&key)) {
            Ok(Some(value)) => GroupConcernConfig::decode(&value).unwrap_or_else(|e| {
                error!(%group, %id, "corrupt group concern config: {:?}", e);
                GroupConcernConfig::default()
            }),
            Ok(None) => GroupConcernConfig::default(),
            Err(e) => {
                error!(%group, %id, "get_group_concern_config failed: {:?}", e);
                GroupConcernConfig::default()
            }
        }
    }

    /// Loads the existing (or default) config inside one write transaction
    /// and hands it to `f`. The config is persisted only when `f` returns
    /// [`TxDecision::Commit`]; either way the carried value is returned.
    pub fn operate_group_concern_config<R>(
        &self,
        group: i64,
        id: &SubjectId,
        f: impl FnOnce(&mut GroupConcernConfig) -> TxDecision<R>,
    ) -> Result<R> {
        self.check_subject(id)?;
        self.ensure_group_indexes(group);
        let key = self.keys.group_key(Namespace::ConcernConfig, group, id);
        self.store.write_tx(|tx| {
            let mut config = match tx.get(&key)? {
                Some(value) => GroupConcernConfig::decode(&value)?,
                None => GroupConcernConfig::default(),
            };
            match f(&mut config) {
                TxDecision::Commit(r) => {
                    tx.set(&key, config.encode()?, None)?;
                    Ok(TxDecision::Commit(r))
                }
                TxDecision::Rollback(r) => Ok(TxDecision::Rollback(r)),
            }
        })
    }

    // ---------------------------------------------------------------
    // Debounce marks

    /// Atomic test-and-set of the at-all mark. True at most once per
    /// `at_all_mark_ttl` window for each (group, id).
    ///
    /// A failed commit returns false so that a broken store never causes
    /// repeated broadcasts.
    pub fn check_and_set_at_all_mark(
        &self,
        group: i64,
        id: &SubjectId,
    ) -> bool {
        if let Err(e) = self.check_subject(id) {
            error!(%group, %id, "check_and_set_at_all_mark: {:?}", e);
            return false;
        }
        let key = self.keys.group_key(Namespace::AtAllMark, group, id);
        let ttl = self.config.state.at_all_mark_ttl();
        let result = self.store.write_tx(|tx| {
            if tx.get(&key)?.is_some() {
                return Ok(TxDecision::Rollback(false));
            }
            tx.set(&key, MARK_VALUE, Some(ttl))?;
            Ok(TxDecision::Commit(true))
        });
        match result {
            Ok(set) => set,
            Err(e) => {
                error!(%group, %id, "set at-all mark failed: {:?}", e);
                false
            }
        }
    }

    /// True exactly when the fresh mark of `id` is absent. With `set_ttl`
    /// the mark is set for `fresh_mark_ttl` in the same transaction.
    pub fn fresh_check(
        &self,
        id: &SubjectId,
        set_ttl: bool,
    ) -> Result<bool> {
        self.check_subject(id)?;
        let key = self.keys.subject_key(Namespace::FreshMark, id);
        let ttl = self.config.state.fresh_mark_ttl();
        self.store.write_tx(|tx| {
            if tx.get(&key)?.is_some() {
                return Ok(TxDecision::Rollback(false));
            }
            if set_ttl {
                tx.set(&key, MARK_VALUE, Some(ttl))?;
            }
            Ok(TxDecision::Commit(true))
        })
    }

    // ---------------------------------------------------------------
    // Concern state

    /// Fails with `AlreadyExists` if `id` already carries any of `ctype` in
    /// `group`.
    pub fn check_group_concern(
        &self,
        group: i64,
        id: &SubjectId,
        ctype: ConcernType,
    ) -> Result<()> {
        if self.get_group_concern(group, id)?.contains_any(ctype) {
            return Err(ConcernError::AlreadyExists {
                group: Some(group),
                id: id.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Like [`Self::check_group_concern`] over the union of all groups.
    pub fn check_concern(
        &self,
        id: &SubjectId,
        ctype: ConcernType,
    ) -> Result<()> {
        if self.get_concern(id)?.contains_any(ctype) {
            return Err(ConcernError::AlreadyExists {
                group: None,
                id: id.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Unions `ctype` into the record of (`group`, `id`) and returns the
    /// stored result.
    ///
    /// With emission enabled, a subject that had no subscription in any
    /// group before this call gets one immediate event per bit of `ctype`.
    pub fn add_group_concern(
        &self,
        group: i64,
        id: &SubjectId,
        ctype: ConcernType,
    ) -> Result<ConcernType> {
        self.check_subject(id)?;
        self.ensure_group_indexes(group);

        let old = self.get_concern(id)?;
        let key = self.keys.group_key(Namespace::ConcernState, group, id);
        let new = self.upsert_concern_type(&key, ctype)?;
        debug!(%group, %id, %old, %new, "add group concern");

        if old.is_empty() {
            if let Some(queue) = &self.emit_queue {
                for bit in ctype.split() {
                    queue.add(EmitEvent::new(id.clone(), bit), None);
                }
            }
        }
        Ok(new)
    }

    /// Removes `ctype` from the record of (`group`, `id`); the record is
    /// deleted once nothing is left.
    pub fn remove_group_concern(
        &self,
        group: i64,
        id: &SubjectId,
        ctype: ConcernType,
    ) -> Result<ConcernType> {
        self.check_subject(id)?;
        let key = self.keys.group_key(Namespace::ConcernState, group, id);
        self.store.write_tx(|tx| {
            let Some(value) = tx.get(&key)? else {
                return Err(Error::not_found(key.as_str()));
            };
            let new = decode_state(&key, &value).remove(ctype);
            if new.is_empty() {
                tx.delete(&key)?;
            } else {
                tx.set(&key, new.encode(), None)?;
            }
            debug!(%group, %id, %new, "remove group concern");
            Ok(TxDecision::Commit(new))
        })
    }

    /// Deletes every concern-state and config record of `group`, then drops
    /// the group's indexes.
    pub fn remove_all_by_group_code(
        &self,
        group: i64,
    ) -> Result<()> {
        let namespaces = [Namespace::ConcernState, Namespace::ConcernConfig];
        for ns in namespaces {
            let index = self.keys.group_index(ns, group);
            self.store.create_index(&index, &pattern(&index));
        }

        let removed = self.store.write_tx(|tx| {
            let mut stale = Vec::new();
            for ns in namespaces {
                tx.ascend(&self.keys.group_index(ns, group), |key, _| {
                    stale.push(key.to_string());
                    true
                })?;
            }
            for key in &stale {
                tx.delete(key)?;
            }
            Ok(TxDecision::Commit(stale.len()))
        })?;

        for ns in Namespace::ALL.into_iter().filter(|ns| ns.is_grouped()) {
            self.store.drop_index(&self.keys.group_index(ns, group));
        }
        info!(%group, removed, "removed all concerns of group");
        Ok(())
    }

    /// Deletes the concern-state and config records of `id` in every group.
    pub fn remove_all_by_id(
        &self,
        id: &SubjectId,
    ) -> Result<()> {
        self.check_subject(id)?;
        let removed = self.store.write_tx(|tx| {
            let mut stale = Vec::new();
            for ns in [Namespace::ConcernState, Namespace::ConcernConfig] {
                tx.ascend(&self.keys.index(ns), |key, _| {
                    match self.keys.parse_group_key(ns, key) {
                        Ok((_, parsed)) if parsed == *id => stale.push(key.to_string()),
                        Ok(_) => {}
                        Err(e) => warn!(%key, "skip unparsable key: {:?}", e),
                    }
                    true
                })?;
            }
            for key in &stale {
                tx.delete(key)?;
            }
            Ok(TxDecision::Commit(stale.len()))
        })?;
        info!(%id, removed, "removed all concerns of id");
        Ok(())
    }

    /// Concern type of `id` in `group`; `EMPTY` when not subscribed.
    pub fn get_group_concern(
        &self,
        group: i64,
        id: &SubjectId,
    ) -> Result<ConcernType> {
        self.check_subject(id)?;
        let key = self.keys.group_key(Namespace::ConcernState, group, id);
        let value = self.store.read_tx(|tx| tx.get(&key))?;
        Ok(value
            .map(|v| decode_state(&key, &v))
            .unwrap_or(ConcernType::EMPTY))
    }

    /// Union of the concern types of `id` across all groups.
    pub fn get_concern(
        &self,
        id: &SubjectId,
    ) -> Result<ConcernType> {
        self.check_subject(id)?;
        let mut result = ConcernType::EMPTY;
        self.list(|_, candidate, ctype| {
            if candidate == id {
                result |= ctype;
            }
            false
        })?;
        Ok(result)
    }

    /// Scans every concern-state record in key order and collects those
    /// accepted by `filter`. Records holding no category are skipped; a key
    /// that fails to parse aborts the scan.
    ///
    /// `filter` runs inside a read transaction and must not call back into
    /// any write operation of this manager; that would deadlock.
    pub fn list(
        &self,
        mut filter: impl FnMut(i64, &SubjectId, ConcernType) -> bool,
    ) -> Result<ConcernListing> {
        let index = self.keys.index(Namespace::ConcernState);
        self.store.read_tx(|tx| {
            let (mut groups, mut ids, mut types) = (Vec::new(), Vec::new(), Vec::new());
            let mut parse_error = None;
            tx.ascend(&index, |key, value| {
                let (group, id) = match self.keys.parse_group_key(Namespace::ConcernState, key) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        parse_error = Some(e);
                        return false;
                    }
                };
                let ctype = decode_state(key, value);
                if ctype.is_empty() {
                    return true;
                }
                if filter(group, &id, ctype) {
                    groups.push(group);
                    ids.push(id);
                    types.push(ctype);
                }
                true
            })?;
            match parse_error {
                Some(e) => Err(e),
                None => Ok((groups, ids, types)),
            }
        })
    }

    /// Like [`Self::list`] restricted to one group. A group without an
    /// index (never subscribed, or removed) lists nothing.
    /// The same no-write restriction applies to `filter`.
    pub fn list_by_group(
        &self,
        group: i64,
        mut filter: impl FnMut(&SubjectId, ConcernType) -> bool,
    ) -> Result<(Vec<SubjectId>, Vec<ConcernType>)> {
        let index = self.keys.group_index(Namespace::ConcernState, group);
        let result = self.store.read_tx(|tx| {
            let (mut ids, mut types) = (Vec::new(), Vec::new());
            let mut parse_error = None;
            tx.ascend(&index, |key, value| {
                let id = match self.keys.parse_group_key(Namespace::ConcernState, key) {
                    Ok((_, id)) => id,
                    Err(e) => {
                        parse_error = Some(e);
                        return false;
                    }
                };
                let ctype = decode_state(key, value);
                if filter(&id, ctype) {
                    ids.push(id);
                    types.push(ctype);
                }
                true
            })?;
            match parse_error {
                Some(e) => Err(e),
                None => Ok((ids, types)),
            }
        });
        match result {
            Err(e) if e.is_index_not_found() => {
                debug!(%group, "no index for group, nothing to list");
                Ok((Vec::new(), Vec::new()))
            }
            other => other,
        }
    }

    /// Distinct subscribed subjects across all groups, sorted.
    pub fn list_ids(&self) -> Result<Vec<SubjectId>> {
        let mut set = BTreeSet::new();
        self.list(|_, id, _| {
            set.insert(id.clone());
            false
        })?;
        Ok(set.into_iter().collect())
    }

    /// Collapses parallel arrays so each id appears once with the union of
    /// its types. Ids keep the order of their first occurrence.
    pub fn group_type_by_id(
        ids: Vec<SubjectId>,
        types: Vec<ConcernType>,
    ) -> Result<(Vec<SubjectId>, Vec<ConcernType>)> {
        if ids.len() != types.len() {
            return Err(ConcernError::LengthMismatch {
                ids: ids.len(),
                types: types.len(),
            }
            .into());
        }
        let mut position: HashMap<SubjectId, usize> = HashMap::with_capacity(ids.len());
        let mut out_ids = Vec::new();
        let mut out_types: Vec<ConcernType> = Vec::new();
        for (id, ctype) in ids.into_iter().zip(types) {
            match position.get(&id) {
                Some(&i) => out_types[i] |= ctype,
                None => {
                    position.insert(id.clone(), out_ids.len());
                    out_ids.push(id);
                    out_types.push(ctype);
                }
            }
        }
        Ok((out_ids, out_types))
    }

    // ---------------------------------------------------------------
    // Index lifecycle

    /// (Re)creates the global indexes of every namespace and the per-group
    /// indexes for `groups`, or for every group in membership when `groups`
    /// is empty.
    pub fn fresh_index(
        &self,
        groups: &[i64],
    ) {
        self.ensure_global_indexes();
        let groups = if groups.is_empty() {
            self.membership.group_codes()
        } else {
            groups.to_vec()
        };
        for group in groups {
            self.ensure_group_indexes(group);
        }
    }

    /// Full resync against membership: reload, rebuild indexes, delete the
    /// concern-state of groups the bot is no longer in, purge expired
    /// records.
    pub fn fresh_all(&self) -> Result<()> {
        if let Err(e) = self.membership.reload() {
            error!("reload membership failed, skip resync: {:?}", e);
            return Err(e);
        }

        for ns in Namespace::ALL.into_iter().filter(|ns| ns.is_grouped()) {
            let group_prefix = format!("{}{KEY_SEPARATOR}", self.keys.index(ns));
            for index in self.store.indexes() {
                if index.starts_with(&group_prefix) {
                    self.store.drop_index(&index);
                }
            }
        }
        self.fresh_index(&[]);

        let groups: HashSet<i64> = self.membership.group_codes().into_iter().collect();
        let index = self.keys.index(Namespace::ConcernState);
        let removed = self.store.write_tx(|tx| {
            let mut stale = Vec::new();
            tx.ascend(&index, |key, _| {
                match self.keys.parse_group_key(Namespace::ConcernState, key) {
                    Ok((group, _)) if groups.contains(&group) => {}
                    Ok(_) => stale.push(key.to_string()),
                    Err(e) => {
                        warn!(%key, "remove unparsable key: {:?}", e);
                        stale.push(key.to_string());
                    }
                }
                true
            })?;
            for key in &stale {
                tx.delete(key)?;
            }
            Ok(TxDecision::Commit(stale.len()))
        })?;

        let purged = self.store.purge_expired()?;
        info!(groups = groups.len(), removed, purged, "fresh all done");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Emission

    /// Builds indexes and, with emission enabled, seeds the queue with one
    /// immediate event per (subject, category) currently subscribed.
    pub fn start(&self) -> Result<()> {
        self.fresh_index(&[]);
        let Some(queue) = &self.emit_queue else {
            return Ok(());
        };

        let (_, ids, types) = self.list(|_, _, _| true)?;
        let (ids, types) = Self::group_type_by_id(ids, types)?;
        let now = Instant::now();
        let mut seeded = 0;
        for (id, ctype) in ids.into_iter().zip(types) {
            for bit in ctype.split() {
                queue.add(EmitEvent::new(id.clone(), bit), Some(now));
                seeded += 1;
            }
        }
        info!(seeded, "state manager started");
        Ok(())
    }

    /// Runs the dispatch loop on the current task until the emit channel
    /// closes. Only one loop may run per manager; a second call logs and
    /// returns at once.
    pub async fn emit_fresh_core<F>(
        &self,
        name: &str,
        fresher: &F,
    ) -> Result<()>
    where
        F: Fresher + ?Sized,
    {
        if self.emit_queue.is_none() {
            return Err(ConcernError::EmissionDisabled.into());
        }
        let Some(rx) = self.emit_rx.lock().take() else {
            warn!(%name, "dispatch loop is already running");
            return Ok(());
        };
        run_dispatch_loop(name, rx, self, fresher).await;
        Ok(())
    }

    /// Spawns the emit ticker and the dispatch loop.
    ///
    /// Once `shutdown` fires the ticker releases what is already due, drops
    /// the rest and closes the channel; the dispatch loop then drains the
    /// channel and exits.
    pub fn spawn_emit<F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        fresher: Arc<F>,
        shutdown: watch::Receiver<()>,
    ) -> Result<Vec<JoinHandle<()>>>
    where
        F: Fresher + ?Sized,
    {
        let Some(queue) = self.emit_queue.clone() else {
            return Err(ConcernError::EmissionDisabled.into());
        };
        let name = name.into();

        let ticker = tokio::spawn(async move { queue.run(shutdown).await });
        let manager = self.clone();
        let dispatcher = tokio::spawn(async move {
            if let Err(e) = manager.emit_fresh_core(&name, fresher.as_ref()).await {
                error!(%name, "dispatch loop failed: {:?}", e);
            }
        });
        Ok(vec![ticker, dispatcher])
    }

    // ---------------------------------------------------------------

    pub(crate) fn check_subject(
        &self,
        id: &SubjectId,
    ) -> Result<()> {
        let expected = self.keys.subject_kind();
        if id.kind() != expected {
            return Err(
                ConcernError::InvalidSubject(format!("expected {expected:?} id, got {id:?}")).into(),
            );
        }
        // anything written must parse back, or later scans abort on it
        if SubjectId::parse(expected, &id.to_string())? != *id {
            return Err(ConcernError::InvalidSubject(format!("{id:?} does not round-trip")).into());
        }
        Ok(())
    }

    fn ensure_global_indexes(&self) {
        for ns in Namespace::ALL {
            let index = self.keys.index(ns);
            self.store.create_index(&index, &pattern(&index));
        }
    }

    fn ensure_group_indexes(
        &self,
        group: i64,
    ) {
        for ns in Namespace::ALL.into_iter().filter(|ns| ns.is_grouped()) {
            let index = self.keys.group_index(ns, group);
            self.store.create_index(&index, &pattern(&index));
        }
    }

    /// Create-or-union. An empty `ctype` leaves the store untouched so no
    /// empty record is ever written.
    fn upsert_concern_type(
        &self,
        key: &str,
        ctype: ConcernType,
    ) -> Result<ConcernType> {
        self.store.write_tx(|tx| {
            let current = tx
                .get(key)?
                .map(|v| decode_state(key, &v))
                .unwrap_or(ConcernType::EMPTY);
            if ctype.is_empty() {
                return Ok(TxDecision::Rollback(current));
            }
            let new = current.add(ctype);
            tx.set(key, new.encode(), None)?;
            Ok(TxDecision::Commit(new))
        })
    }
}

impl FreshGate for StateManager {
    fn fresh_check(
        &self,
        id: &SubjectId,
        set_ttl: bool,
    ) -> Result<bool> {
        StateManager::fresh_check(self, id, set_ttl)
    }
}

fn decode_state(
    key: &str,
    value: &str,
) -> ConcernType {
    ConcernType::decode(value).unwrap_or_else(|| {
        warn!(%key, %value, "undecodable concern type");
        ConcernType::EMPTY
    })
}
