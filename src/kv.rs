//! sled database for the key-value backed stores
//!
//! One sled database, one tree per store:
//!
//! - `nodes` - reputation stats keyed by raw node id (MessagePack values)
//! - `irreparable` - irreparable segments keyed by segment path
//! - `directory` - cached node descriptors keyed by raw node id

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::Path;
use tracing::info;

use crate::error::StoreError;

pub const NODES_TREE: &str = "nodes";
pub const IRREPARABLE_TREE: &str = "irreparable";
pub const DIRECTORY_TREE: &str = "directory";

/// sled database handle
#[derive(Clone)]
pub struct SledDb {
    db: Db,
}

impl SledDb {
    /// Open or create the database directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened sled database");
        Ok(Self { db })
    }

    /// Throwaway database removed on drop (for testing)
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open a named tree
    pub fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Encode a stored value as a MessagePack map
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a stored value; a malformed value is a `Decode` error
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| StoreError::Decode(format!("Deserialization error: {}", e)))
}
