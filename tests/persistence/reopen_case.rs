//! Records written through one manager survive closing and reopening the
//! database; indexes are rebuilt by `start`.

use concern_state::ConcernType;
use concern_state::SubjectId;
use concern_state::TxDecision;
use tempfile::tempdir;

use crate::commons::membership;
use crate::commons::open_manager;
use crate::commons::sled_config;
use crate::commons::GROUP_A;
use crate::commons::GROUP_B;

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let config = sled_config(&dir.path().join("concern"));
    let room = SubjectId::Numeric(42);

    {
        let manager = open_manager(&config, membership(vec![GROUP_A, GROUP_B]), false).unwrap();
        manager.add_group_concern(GROUP_A, &room, ConcernType::LIVE).unwrap();
        manager
            .add_group_concern(GROUP_B, &room, ConcernType::NEWS | ConcernType::VIDEO)
            .unwrap();
        manager
            .operate_group_concern_config(GROUP_A, &room, |c| {
                c.at.at_all = ConcernType::LIVE;
                TxDecision::Commit(())
            })
            .unwrap();
        assert!(manager.check_and_set_at_all_mark(GROUP_A, &room));
        manager.store().flush().unwrap();
    }

    let manager = open_manager(&config, membership(vec![GROUP_A, GROUP_B]), false).unwrap();
    manager.start().unwrap();

    assert_eq!(
        manager.get_concern(&room).unwrap(),
        ConcernType::LIVE | ConcernType::NEWS | ConcernType::VIDEO
    );
    let (ids, types) = manager.list_by_group(GROUP_B, |_, _| true).unwrap();
    assert_eq!(ids, vec![room.clone()]);
    assert_eq!(types, vec![ConcernType::NEWS | ConcernType::VIDEO]);
    assert!(manager.get_group_concern_config(GROUP_A, &room).should_at_all(ConcernType::LIVE));
    // the two hour mark outlives the process
    assert!(!manager.check_and_set_at_all_mark(GROUP_A, &room));
}

#[test]
fn test_fresh_all_after_leaving_group() {
    let dir = tempdir().unwrap();
    let config = sled_config(&dir.path().join("concern"));
    let members = membership(vec![GROUP_A, GROUP_B]);
    let manager = open_manager(&config, members.clone(), false).unwrap();

    for raw in 1..=3 {
        manager
            .add_group_concern(GROUP_A, &SubjectId::Numeric(raw), ConcernType::LIVE)
            .unwrap();
    }
    manager
        .add_group_concern(GROUP_B, &SubjectId::Numeric(9), ConcernType::LIVE)
        .unwrap();

    members.set_groups(vec![GROUP_B]);
    manager.fresh_all().unwrap();

    assert_eq!(manager.list_ids().unwrap(), vec![SubjectId::Numeric(9)]);
    let (ids, _) = manager.list_by_group(GROUP_A, |_, _| true).unwrap();
    assert!(ids.is_empty());
}
