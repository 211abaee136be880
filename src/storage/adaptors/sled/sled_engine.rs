use sled::Batch;
use tracing::debug;
use tracing::warn;

use crate::constants::CONCERN_TREE;
use crate::BatchOp;
use crate::KvEngine;
use crate::Result;
use crate::StorageConfig;
use crate::WriteBatch;

/// Persistent engine backed by a single sled tree.
pub struct SledEngine {
    db: sled::Db,
    tree: sled::Tree,
}

impl std::fmt::Debug for SledEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledEngine").field("tree_len", &self.tree.len()).finish()
    }
}

impl SledEngine {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        debug!("open concern db from path: {:?}", &config.db_path);

        let db = sled::Config::default()
            .path(&config.db_path)
            .temporary(config.temporary)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms)
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!(
                    "Try to open DB at this location: {:?} and failed: {:?}",
                    config.db_path, e
                );
                e
            })?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(CONCERN_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

impl KvEngine for SledEngine {
    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut result = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (k, v) = item?;
            result.push((k.to_vec(), v.to_vec()));
        }
        Ok(result)
    }

    fn apply_batch(
        &self,
        batch: WriteBatch,
    ) -> Result<()> {
        let mut sled_batch = Batch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => sled_batch.insert(key, value),
                BatchOp::Delete { key } => sled_batch.remove(key),
            }
        }
        self.tree.apply_batch(sled_batch)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}
