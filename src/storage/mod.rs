mod adaptors;
mod record;
mod storage_engine;
mod transaction;


pub use adaptors::*;
pub use storage_engine::*;
pub use transaction::*;

use std::sync::Arc;

use crate::Result;
use crate::StorageConfig;

/// Opens the sled database described by `config` and wraps it in a
/// transaction store.
pub fn open_sled_store(config: &StorageConfig) -> Result<Arc<TransactionStore>> {
    let engine = SledEngine::open(config)?;
    Ok(Arc::new(TransactionStore::new(Arc::new(engine))))
}

/// Transaction store over a fresh in-memory engine.
pub fn mem_store() -> Arc<TransactionStore> {
    Arc::new(TransactionStore::new(Arc::new(MemEngine::new())))
}
