//! Subscriptions flow from the manager through the ticker to a fresher,
//! and shutdown stops both tasks.

use std::time::Duration;

use concern_state::ConcernType;
use concern_state::SubjectId;
use tempfile::tempdir;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::commons::membership;
use crate::commons::open_manager;
use crate::commons::sled_config;
use crate::commons::ChannelFresher;
use crate::commons::GROUP_A;
use crate::commons::GROUP_B;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_existing_and_new_subscriptions_are_dispatched() {
    let dir = tempdir().unwrap();
    let config = sled_config(&dir.path().join("concern"));
    let old_room = SubjectId::Numeric(1);
    let new_room = SubjectId::Numeric(2);

    {
        let manager = open_manager(&config, membership(vec![GROUP_A]), false).unwrap();
        manager.add_group_concern(GROUP_A, &old_room, ConcernType::LIVE).unwrap();
        manager.store().flush().unwrap();
    }

    let manager = open_manager(&config, membership(vec![GROUP_A, GROUP_B]), true).unwrap();
    manager.start().unwrap();
    assert_eq!(manager.pending_emits(), 1);

    let (fresher, mut rx) = ChannelFresher::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handles = manager.spawn_emit("bilibili", fresher, shutdown_rx).unwrap();

    let first = timeout(WAIT, rx.recv()).await.unwrap();
    assert_eq!(first, Some((ConcernType::LIVE, old_room.clone())));

    manager.add_group_concern(GROUP_B, &new_room, ConcernType::VIDEO).unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap();
    assert_eq!(second, Some((ConcernType::VIDEO, new_room.clone())));

    // already tracked subject gaining a group is not dispatched again
    manager.add_group_concern(GROUP_B, &old_room, ConcernType::NEWS).unwrap();
    assert_eq!(manager.pending_emits(), 0);

    shutdown_tx.send(()).unwrap();
    for handle in handles {
        timeout(WAIT, handle).await.unwrap().unwrap();
    }
    assert!(rx.try_recv().is_err());
}
