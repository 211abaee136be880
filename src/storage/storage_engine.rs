#[cfg(test)]
use mockall::automock;

use crate::Result;

/// One staged mutation of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Mutations applied atomically by [`KvEngine::apply_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn put(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(
        &mut self,
        key: impl Into<Vec<u8>>,
    ) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Ordered byte-keyed engine underneath the transaction store.
///
/// Implementations only need point reads, ordered prefix scans and atomic
/// batch application; isolation between transactions is provided by
/// [`crate::TransactionStore`].
#[cfg_attr(test, automock)]
pub trait KvEngine: Send + Sync + 'static {
    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies every operation or none of them.
    fn apply_batch(
        &self,
        batch: WriteBatch,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
