//! Delayed delivery of "new subscription" events.
//!
//! ```text
//! add_group_concern / start
//!        │ add(event, at)
//!        ▼
//!   EmitQueue.pending ──ticker (interval)──▶ mpsc channel ──▶ dispatch loop
//!                                                              │ fresh_check(id, true)
//!                                                              ▼
//!                                                         Fresher::fresh
//! ```

mod dispatcher;
mod emit_queue;
pub use dispatcher::*;
pub use emit_queue::*;


use crate::ConcernType;
use crate::SubjectId;

/// One category of one subject waiting to be refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmitEvent {
    pub id: SubjectId,
    /// Always a single category bit
    pub ctype: ConcernType,
}

impl EmitEvent {
    pub fn new(
        id: SubjectId,
        ctype: ConcernType,
    ) -> Self {
        Self { id, ctype }
    }
}
