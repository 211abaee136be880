use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use concern_state::open_sled_store;
use concern_state::ConcernConfig;
use concern_state::ConcernType;
use concern_state::Fresher;
use concern_state::KeySet;
use concern_state::MembershipProvider;
use concern_state::Result;
use concern_state::StateManager;
use concern_state::StaticMembership;
use concern_state::SubjectId;
use concern_state::SubjectKind;
use tokio::sync::mpsc;

pub const GROUP_A: i64 = 100;
pub const GROUP_B: i64 = 200;

pub fn sled_config(db_path: &Path) -> ConcernConfig {
    let mut config = ConcernConfig::default();
    config.storage.db_path = db_path.to_path_buf();
    config.storage.flush_every_ms = None;
    config.emit.interval_ms = 20;
    config
}

/// Opens the sled database at `config.storage.db_path` and builds a numeric
/// manager over it.
pub fn open_manager(
    config: &ConcernConfig,
    membership: Arc<dyn MembershipProvider>,
    use_emit: bool,
) -> Result<Arc<StateManager>> {
    let store = open_sled_store(&config.storage)?;
    Ok(Arc::new(StateManager::new(
        store,
        Arc::new(KeySet::for_platform("bilibili", SubjectKind::Numeric)),
        membership,
        config,
        use_emit,
    )))
}

pub fn membership(groups: Vec<i64>) -> Arc<StaticMembership> {
    Arc::new(StaticMembership::new(groups))
}

/// Forwards every refresh request to a channel.
pub struct ChannelFresher {
    tx: mpsc::UnboundedSender<(ConcernType, SubjectId)>,
}

impl ChannelFresher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(ConcernType, SubjectId)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Fresher for ChannelFresher {
    async fn fresh(
        &self,
        ctype: ConcernType,
        id: &SubjectId,
    ) -> Result<()> {
        let _ = self.tx.send((ctype, id.clone()));
        Ok(())
    }
}
