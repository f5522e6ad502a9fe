//! Ordered byte-keyed stores backing the directory cache

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::kv::{SledDb, DIRECTORY_TREE};

/// Minimal ordered key-value capability
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// One slot per key, in key order of the request
    fn get_all(&self, keys: &[&[u8]]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> StoreResult<()>;

    /// Up to `limit` entries in ascending key order
    fn scan(&self, limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Durable store on a sled tree
pub struct SledKv {
    tree: sled::Tree,
}

impl SledKv {
    pub fn open(db: &SledDb) -> StoreResult<Self> {
        Ok(Self {
            tree: db.tree(DIRECTORY_TREE)?,
        })
    }
}

impl KeyValueStore for SledKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn scan(&self, limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree
            .iter()
            .take(limit)
            .map(|entry| -> StoreResult<_> {
                let (k, v) = entry?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }
}

/// In-process store for embedding and tests
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Internal(format!("Lock poisoned: {}", e))
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn get_all(&self, keys: &[&[u8]]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_vec(), value);
        Ok(())
    }

    fn scan(&self, limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
