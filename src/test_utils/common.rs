use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ConcernConfig;
use crate::ConcernType;
use crate::Error;
use crate::Fresher;
use crate::Result;
use crate::SubjectId;

pub const SHORT_TTL_MS: u64 = 50;

/// Defaults with millisecond windows and a fast ticker.
pub fn short_ttl_config() -> ConcernConfig {
    let mut config = ConcernConfig::default();
    config.emit.interval_ms = 10;
    config.state.at_all_mark_ttl_ms = SHORT_TTL_MS;
    config.state.fresh_mark_ttl_ms = SHORT_TTL_MS;
    config.state.status_ttl_ms = SHORT_TTL_MS;
    config.storage.temporary = true;
    config
}

/// Fresher that records every call and forwards it to a channel so tests
/// can await deliveries.
pub struct RecordingFresher {
    calls: Mutex<Vec<(ConcernType, SubjectId)>>,
    tx: mpsc::UnboundedSender<(ConcernType, SubjectId)>,
    /// Calls for this subject fail after being recorded
    failing: Option<SubjectId>,
}

impl RecordingFresher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ConcernType, SubjectId)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fresher = Self {
            calls: Mutex::new(Vec::new()),
            tx,
            failing: None,
        };
        (fresher, rx)
    }

    pub fn failing_for(
        mut self,
        id: SubjectId,
    ) -> Self {
        self.failing = Some(id);
        self
    }

    pub fn calls(&self) -> Vec<(ConcernType, SubjectId)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fresher for RecordingFresher {
    async fn fresh(
        &self,
        ctype: ConcernType,
        id: &SubjectId,
    ) -> Result<()> {
        self.calls.lock().push((ctype, id.clone()));
        let _ = self.tx.send((ctype, id.clone()));
        if self.failing.as_ref() == Some(id) {
            return Err(Error::fresher(format!("refresh of {id} failed")));
        }
        Ok(())
    }
}
