use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tokio::sync::watch;
use tracing_test::traced_test;

use super::*;
use crate::test_utils::mem_manager;
use crate::test_utils::short_ttl_config;
use crate::test_utils::ManagerBuilder;
use crate::test_utils::RecordingFresher;
use crate::test_utils::SHORT_TTL_MS;
use crate::ConcernError;
use crate::ConcernType;
use crate::Error;
use crate::KeySet;
use crate::MockKvEngine;
use crate::MockMembershipProvider;
use crate::StaticMembership;
use crate::StorageError;
use crate::SubjectId;
use crate::SubjectKind;
use crate::TransactionStore;
use crate::TxDecision;

const LIVE: ConcernType = ConcernType::LIVE;
const NEWS: ConcernType = ConcernType::NEWS;
const VIDEO: ConcernType = ConcernType::VIDEO;

fn id(raw: i64) -> SubjectId {
    SubjectId::Numeric(raw)
}

fn raw_state(
    manager: &StateManager,
    key: &str,
) -> Option<String> {
    manager.store().read_tx(|tx| tx.get(key)).unwrap()
}

fn ttl_elapsed() {
    sleep(Duration::from_millis(SHORT_TTL_MS * 2));
}

#[test]
fn test_subscribe_then_unsubscribe_scenario() {
    let manager = mem_manager();

    let new = manager.add_group_concern(100, &id(42), LIVE).unwrap();
    assert_eq!(new, LIVE);
    assert_eq!(manager.get_group_concern(100, &id(42)).unwrap(), LIVE);
    assert_eq!(manager.get_concern(&id(42)).unwrap(), LIVE);

    let new = manager.remove_group_concern(100, &id(42), LIVE).unwrap();
    assert_eq!(new, ConcernType::EMPTY);
    assert_eq!(raw_state(&manager, "g-concern-state:100:42"), None);
    assert_eq!(manager.get_group_concern(100, &id(42)).unwrap(), ConcernType::EMPTY);
    assert_eq!(manager.get_concern(&id(42)).unwrap(), ConcernType::EMPTY);
}

#[test]
fn test_stored_type_is_net_of_adds_and_removes() {
    let manager = mem_manager();
    let key = "g-concern-state:7:1";

    assert_eq!(manager.add_group_concern(7, &id(1), LIVE).unwrap(), LIVE);
    assert_eq!(manager.add_group_concern(7, &id(1), NEWS | VIDEO).unwrap(), LIVE | NEWS | VIDEO);
    assert_eq!(manager.remove_group_concern(7, &id(1), NEWS).unwrap(), LIVE | VIDEO);
    assert_eq!(raw_state(&manager, key).as_deref(), Some("5"));

    // removing bits that were never set leaves the record alone
    assert_eq!(manager.remove_group_concern(7, &id(1), NEWS).unwrap(), LIVE | VIDEO);

    assert_eq!(manager.remove_group_concern(7, &id(1), LIVE | VIDEO).unwrap(), ConcernType::EMPTY);
    assert_eq!(raw_state(&manager, key), None);

    // adding nothing never creates a record
    assert_eq!(manager.add_group_concern(7, &id(1), ConcernType::EMPTY).unwrap(), ConcernType::EMPTY);
    assert_eq!(raw_state(&manager, key), None);
}

#[test]
fn test_remove_missing_record_is_not_found() {
    let manager = mem_manager();
    let err = manager.remove_group_concern(1, &id(2), LIVE).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_check_group_concern_and_check_concern() {
    let manager = mem_manager();
    manager.add_group_concern(100, &id(42), LIVE).unwrap();

    assert!(manager.check_group_concern(100, &id(42), NEWS).is_ok());
    assert!(manager.check_group_concern(200, &id(42), LIVE).is_ok());
    let err = manager.check_group_concern(100, &id(42), LIVE | NEWS).unwrap_err();
    assert!(matches!(
        err,
        Error::Concern(ConcernError::AlreadyExists { group: Some(100), .. })
    ));

    assert!(manager.check_concern(&id(42), VIDEO).is_ok());
    assert!(manager.check_concern(&id(43), LIVE).is_ok());
    let err = manager.check_concern(&id(42), LIVE).unwrap_err();
    assert!(matches!(
        err,
        Error::Concern(ConcernError::AlreadyExists { group: None, .. })
    ));
}

#[test]
fn test_emit_only_on_first_subscription() {
    let manager = ManagerBuilder::new().with_emit().build();

    manager.add_group_concern(100, &id(42), LIVE | NEWS).unwrap();
    assert_eq!(manager.pending_emits(), 2);

    // already tracked elsewhere: persisted, not emitted
    manager.add_group_concern(200, &id(42), VIDEO).unwrap();
    assert_eq!(manager.pending_emits(), 2);
    assert_eq!(manager.get_concern(&id(42)).unwrap(), LIVE | NEWS | VIDEO);

    manager.add_group_concern(100, &id(43), LIVE).unwrap();
    assert_eq!(manager.pending_emits(), 3);
}

#[test]
fn test_no_emit_when_disabled() {
    let manager = mem_manager();
    manager.add_group_concern(100, &id(42), LIVE).unwrap();
    assert_eq!(manager.pending_emits(), 0);
}

#[tokio::test]
async fn test_emission_disabled_errors() {
    let manager = Arc::new(mem_manager());
    let (fresher, _rx) = RecordingFresher::new();

    let err = manager.emit_fresh_core("test", &fresher).await.unwrap_err();
    assert!(matches!(err, Error::Concern(ConcernError::EmissionDisabled)));

    let (_tx, shutdown) = watch::channel(());
    let err = manager.spawn_emit("test", Arc::new(fresher), shutdown).unwrap_err();
    assert!(matches!(err, Error::Concern(ConcernError::EmissionDisabled)));
}

#[test]
fn test_at_all_mark_once_per_window() {
    let manager = mem_manager();

    assert!(manager.check_and_set_at_all_mark(100, &id(42)));
    assert!(!manager.check_and_set_at_all_mark(100, &id(42)));
    assert!(manager.check_and_set_at_all_mark(200, &id(42)));
    assert!(manager.check_and_set_at_all_mark(100, &id(43)));

    ttl_elapsed();
    assert!(manager.check_and_set_at_all_mark(100, &id(42)));
    assert!(!manager.check_and_set_at_all_mark(100, &id(42)));
}

#[test]
#[traced_test]
fn test_at_all_mark_fails_closed() {
    let mut engine = MockKvEngine::new();
    engine.expect_get().returning(|_| Ok(None));
    engine
        .expect_apply_batch()
        .returning(|_| Err(StorageError::DbError("read only".into()).into()));
    let manager = ManagerBuilder::new()
        .with_store(Arc::new(TransactionStore::new(Arc::new(engine))))
        .build();

    assert!(!manager.check_and_set_at_all_mark(100, &id(42)));
    assert!(logs_contain("set at-all mark failed"));
}

#[test]
fn test_fresh_check_once_per_window_across_groups() {
    let manager = mem_manager();

    // probing without setting never closes the window
    assert!(manager.fresh_check(&id(42), false).unwrap());
    assert!(manager.fresh_check(&id(42), false).unwrap());

    assert!(manager.fresh_check(&id(42), true).unwrap());
    assert!(!manager.fresh_check(&id(42), true).unwrap());
    assert!(!manager.fresh_check(&id(42), false).unwrap());
    assert!(manager.fresh_check(&id(43), true).unwrap());

    ttl_elapsed();
    assert!(manager.fresh_check(&id(42), true).unwrap());
}

#[test]
fn test_group_type_by_id() {
    let err = StateManager::group_type_by_id(vec![id(1), id(2)], vec![LIVE]).unwrap_err();
    assert!(matches!(
        err,
        Error::Concern(ConcernError::LengthMismatch { ids: 2, types: 1 })
    ));

    let (ids, types) = StateManager::group_type_by_id(
        vec![id(2), id(1), id(2), id(3), id(1)],
        vec![LIVE, NEWS, VIDEO, LIVE, NEWS],
    )
    .unwrap();
    assert_eq!(ids, vec![id(2), id(1), id(3)]);
    assert_eq!(types, vec![LIVE | VIDEO, NEWS, LIVE]);

    let (ids, types) = StateManager::group_type_by_id(Vec::new(), Vec::new()).unwrap();
    assert!(ids.is_empty() && types.is_empty());
}

#[test]
fn test_remove_all_by_group_code_scenario() {
    let manager = mem_manager();
    for subject in [1, 2, 3] {
        manager.add_group_concern(100, &id(subject), LIVE).unwrap();
    }
    manager.add_group_concern(200, &id(1), NEWS).unwrap();
    manager
        .operate_group_concern_config(100, &id(1), |c| {
            c.notify.offline_notify = LIVE;
            TxDecision::Commit(())
        })
        .unwrap();

    manager.remove_all_by_group_code(100).unwrap();

    let (ids, types) = manager.list_by_group(100, |_, _| true).unwrap();
    assert!(ids.is_empty() && types.is_empty());
    assert_eq!(manager.get_group_concern_config(100, &id(1)), Default::default());
    assert!(!manager.store().has_index("g-concern-state:100"));

    let (ids, types) = manager.list_by_group(200, |_, _| true).unwrap();
    assert_eq!(ids, vec![id(1)]);
    assert_eq!(types, vec![NEWS]);
    assert_eq!(manager.get_concern(&id(1)).unwrap(), NEWS);

    // group is usable again afterwards
    manager.add_group_concern(100, &id(9), VIDEO).unwrap();
    assert_eq!(manager.list_by_group(100, |_, _| true).unwrap().0, vec![id(9)]);
}

#[test]
fn test_remove_all_by_id() {
    let manager = mem_manager();
    manager.add_group_concern(100, &id(42), LIVE).unwrap();
    manager.add_group_concern(200, &id(42), NEWS).unwrap();
    manager.add_group_concern(100, &id(43), LIVE).unwrap();
    manager
        .operate_group_concern_config(200, &id(42), |c| {
            c.at.at_all = LIVE;
            TxDecision::Commit(())
        })
        .unwrap();

    manager.remove_all_by_id(&id(42)).unwrap();

    assert_eq!(manager.get_concern(&id(42)).unwrap(), ConcernType::EMPTY);
    assert_eq!(manager.get_concern(&id(43)).unwrap(), LIVE);
    assert_eq!(manager.get_group_concern_config(200, &id(42)), Default::default());
    assert_eq!(raw_state(&manager, "g-concern-config:200:42"), None);
}

#[test]
fn test_group_concern_config_operate() {
    let manager = mem_manager();
    assert_eq!(manager.get_group_concern_config(1, &id(2)), Default::default());

    let applied = manager
        .operate_group_concern_config(1, &id(2), |c| {
            c.set_at_someone(LIVE, vec![10, 11]);
            TxDecision::Commit(true)
        })
        .unwrap();
    assert!(applied);
    assert_eq!(manager.get_group_concern_config(1, &id(2)).at_list(LIVE), vec![10, 11]);

    let applied = manager
        .operate_group_concern_config(1, &id(2), |c| {
            c.set_at_someone(LIVE, vec![99]);
            TxDecision::Rollback(false)
        })
        .unwrap();
    assert!(!applied);
    assert_eq!(manager.get_group_concern_config(1, &id(2)).at_list(LIVE), vec![10, 11]);
}

#[test]
#[traced_test]
fn test_corrupt_config_reads_as_default() {
    let manager = mem_manager();
    manager
        .store()
        .write_tx(|tx| {
            tx.set("g-concern-config:1:2", "{not json", None)?;
            Ok(TxDecision::Commit(()))
        })
        .unwrap();

    assert_eq!(manager.get_group_concern_config(1, &id(2)), Default::default());
    assert!(logs_contain("corrupt group concern config"));
    // a mutation cannot silently replace a record it cannot read
    assert!(manager
        .operate_group_concern_config(1, &id(2), |_| TxDecision::Commit(()))
        .is_err());
}

#[test]
fn test_list_filters_and_orders() {
    let manager = mem_manager();
    manager.add_group_concern(2, &id(20), LIVE).unwrap();
    manager.add_group_concern(1, &id(10), NEWS).unwrap();
    manager.add_group_concern(1, &id(11), LIVE | VIDEO).unwrap();

    let (groups, ids, types) = manager.list(|_, _, _| true).unwrap();
    assert_eq!(groups, vec![1, 1, 2]);
    assert_eq!(ids, vec![id(10), id(11), id(20)]);
    assert_eq!(types, vec![NEWS, LIVE | VIDEO, LIVE]);

    let (groups, ids, _) = manager.list(|_, _, t| t.contains_any(LIVE)).unwrap();
    assert_eq!(groups, vec![1, 2]);
    assert_eq!(ids, vec![id(11), id(20)]);

    let (ids, _) = manager.list_by_group(1, |_, t| t.contains_all(NEWS)).unwrap();
    assert_eq!(ids, vec![id(10)]);
}

#[test]
fn test_list_aborts_on_unparsable_key() {
    let manager = mem_manager();
    manager.add_group_concern(1, &id(10), NEWS).unwrap();
    manager
        .store()
        .write_tx(|tx| {
            tx.set("g-concern-state:abc:1", "1", None)?;
            Ok(TxDecision::Commit(()))
        })
        .unwrap();

    let err = manager.list(|_, _, _| true).unwrap_err();
    assert!(matches!(err, Error::Concern(ConcernError::InvalidKey { .. })));
}

#[test]
fn test_list_by_group_without_index_is_empty() {
    let manager = mem_manager();
    let (ids, types) = manager.list_by_group(404, |_, _| true).unwrap();
    assert!(ids.is_empty() && types.is_empty());
}

#[test]
fn test_list_ids_is_distinct() {
    let manager = mem_manager();
    manager.add_group_concern(1, &id(5), LIVE).unwrap();
    manager.add_group_concern(2, &id(5), NEWS).unwrap();
    manager.add_group_concern(2, &id(3), NEWS).unwrap();

    assert_eq!(manager.list_ids().unwrap(), vec![id(3), id(5)]);
}

#[test]
fn test_fresh_index_uses_membership_when_no_groups_given() {
    let membership = Arc::new(StaticMembership::new(vec![100, 200]));
    let manager = ManagerBuilder::new().with_membership(membership).build();

    manager.fresh_index(&[]);
    for index in [
        "g-concern-state",
        "g-concern-config",
        "g-atall-mark",
        "fresh-mark",
        "g-concern-state:100",
        "g-concern-config:200",
        "g-atall-mark:100",
    ] {
        assert!(manager.store().has_index(index), "missing {index}");
    }
    assert!(!manager.store().has_index("fresh-mark:100"));

    manager.fresh_index(&[300]);
    assert!(manager.store().has_index("g-concern-state:300"));
}

#[test]
fn test_fresh_all_collects_left_groups() {
    let membership = Arc::new(StaticMembership::new(vec![100, 200]));
    let manager = ManagerBuilder::new().with_membership(membership.clone()).build();
    manager.add_group_concern(100, &id(1), LIVE).unwrap();
    manager.add_group_concern(200, &id(2), LIVE).unwrap();
    manager.check_and_set_at_all_mark(100, &id(1));

    membership.set_groups(vec![100]);
    ttl_elapsed();
    manager.fresh_all().unwrap();

    assert_eq!(manager.list_ids().unwrap(), vec![id(1)]);
    assert!(manager.store().has_index("g-concern-state:100"));
    assert!(!manager.store().has_index("g-concern-state:200"));
    assert_eq!(raw_state(&manager, "g-atall-mark:100:1"), None);
}

#[test]
fn test_fresh_all_skips_gc_when_reload_fails() {
    let mut membership = MockMembershipProvider::new();
    membership
        .expect_reload()
        .returning(|| Err(StorageError::DbError("offline".into()).into()));
    membership.expect_group_codes().returning(Vec::new);
    let manager = ManagerBuilder::new().with_membership(Arc::new(membership)).build();
    manager.add_group_concern(100, &id(1), LIVE).unwrap();

    assert!(manager.fresh_all().is_err());
    assert_eq!(manager.list_ids().unwrap(), vec![id(1)]);
}

#[test]
fn test_start_seeds_one_event_per_subject_category() {
    let store = crate::mem_store();
    let seeding = ManagerBuilder::new().with_store(store.clone()).build();
    seeding.add_group_concern(1, &id(42), LIVE).unwrap();
    seeding.add_group_concern(2, &id(42), LIVE | NEWS).unwrap();
    seeding.add_group_concern(1, &id(43), VIDEO).unwrap();

    let manager = ManagerBuilder::new().with_store(store).with_emit().build();
    assert_eq!(manager.pending_emits(), 0);
    manager.start().unwrap();
    assert_eq!(manager.pending_emits(), 3);
}

#[test]
fn test_handle_key_space_rejects_numeric_ids() {
    let manager = ManagerBuilder::new()
        .with_keys(KeySet::for_platform("youtube", SubjectKind::Handle))
        .build();
    let channel = SubjectId::from("UC-abc:def");

    manager.add_group_concern(1, &channel, LIVE).unwrap();
    assert_eq!(manager.list_ids().unwrap(), vec![channel.clone()]);
    assert_eq!(
        manager
            .store()
            .read_tx(|tx| tx.get("youtube-g-concern-state:1:UC-abc:def"))
            .unwrap()
            .as_deref(),
        Some("1")
    );

    let err = manager.add_group_concern(1, &id(7), LIVE).unwrap_err();
    assert!(matches!(err, Error::Concern(ConcernError::InvalidSubject(_))));
    assert!(!manager.check_and_set_at_all_mark(1, &id(7)));
}

#[test]
fn test_unparsable_handles_are_rejected_before_write() {
    let manager = ManagerBuilder::new()
        .with_keys(KeySet::for_platform("youtube", SubjectKind::Handle))
        .build();

    for bad in ["", "*"] {
        let err = manager
            .add_group_concern(1, &SubjectId::from(bad), LIVE)
            .unwrap_err();
        assert!(matches!(err, Error::Concern(ConcernError::InvalidSubject(_))));
    }

    // nothing was written, so other subjects keep working
    let alice = SubjectId::from("alice");
    manager.add_group_concern(2, &alice, LIVE).unwrap();
    assert_eq!(manager.list_ids().unwrap(), vec![alice.clone()]);
    let (groups, ids, types) = manager.list(|_, _, _| true).unwrap();
    assert_eq!(groups, vec![2]);
    assert_eq!(ids, vec![alice]);
    assert_eq!(types, vec![LIVE]);
}

#[tokio::test]
async fn test_spawned_emit_refreshes_each_subject_once_per_window() {
    let mut config = short_ttl_config();
    config.state.fresh_mark_ttl_ms = 60_000;
    let manager = Arc::new(ManagerBuilder::new().with_config(config).with_emit().build());
    manager.add_group_concern(100, &id(42), LIVE | NEWS).unwrap();
    manager.add_group_concern(100, &id(43), VIDEO).unwrap();

    let (fresher, mut rx) = RecordingFresher::new();
    let fresher = Arc::new(fresher);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handles = manager
        .spawn_emit("test", fresher.clone(), shutdown_rx)
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let (_, subject) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(subject);
    }
    seen.sort();
    assert_eq!(seen, vec![id(42), id(43)]);

    // give the skipped second category of 42 time to pass through
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(fresher.calls().len(), 2);
}

#[tokio::test]
#[traced_test]
async fn test_failing_fresher_does_not_stop_dispatch() {
    let manager = Arc::new(ManagerBuilder::new().with_emit().build());
    let (fresher, mut rx) = RecordingFresher::new();
    let fresher = Arc::new(fresher.failing_for(id(1)));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handles = manager.spawn_emit("test", fresher.clone(), shutdown_rx).unwrap();

    manager.add_group_concern(1, &id(1), LIVE).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(first, Some((LIVE, id(1))));

    manager.add_group_concern(1, &id(2), LIVE).unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(second, Some((LIVE, id(2))));

    shutdown_tx.send(()).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(logs_contain("fresher failed"));
}
