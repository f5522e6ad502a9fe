//! Node directory cache
//!
//! Maps node identity to the last-known network descriptor so the repair
//! pipeline can resolve selected targets without querying peer discovery
//! on every lookup. Keys are raw identity bytes; values are MessagePack
//! encoded [`NodeDescriptor`]s held in any ordered byte-keyed store.
//!
//! The cache is filled by [`NodeDirectoryCache::put`] and by
//! [`NodeDirectoryCache::refresh`] from a [`PeerDiscovery`] source. Refresh
//! is not safe to run concurrently with itself; the daemon drives it from a
//! single timer task.

pub mod discovery;
pub mod store;

pub use discovery::{PeerDiscovery, StaticPeers};
pub use store::{KeyValueStore, MemoryKv, SledKv};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::identity::NodeId;
use crate::kv::{decode, encode};

/// Role a node plays in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Invalid,
    #[default]
    Storage,
    Satellite,
    Uplink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Transport name, e.g. `tcp`
    #[serde(default = "default_transport")]
    pub transport: String,
    pub address: String,
}

fn default_transport() -> String {
    "tcp".to_string()
}

/// Capacity a node advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeRestrictions {
    #[serde(default)]
    pub free_bandwidth: i64,
    #[serde(default)]
    pub free_disk: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperatorMetadata {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub wallet: String,
}

/// Last-known contact and capability information for a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub address: Option<NodeAddress>,
    #[serde(default)]
    pub restrictions: Option<NodeRestrictions>,
    #[serde(default)]
    pub operator: Option<OperatorMetadata>,
}

impl NodeDescriptor {
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: Some(NodeAddress {
                transport: default_transport(),
                address: address.into(),
            }),
            ..Default::default()
        }
    }
}

/// Identity to descriptor cache over a [`KeyValueStore`]
pub struct NodeDirectoryCache {
    kv: Arc<dyn KeyValueStore>,
}

impl NodeDirectoryCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The cached descriptor; `None` when nothing is cached for `id`
    pub fn get(&self, id: &NodeId) -> StoreResult<Option<NodeDescriptor>> {
        self.kv
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    /// One slot per requested id, in request order. A missing entry is a
    /// `None` slot; a corrupt entry fails the whole call.
    pub fn get_all(&self, ids: &[NodeId]) -> StoreResult<Vec<Option<NodeDescriptor>>> {
        if ids.is_empty() {
            return Err(StoreError::Validation("no node ids provided".into()));
        }

        let keys: Vec<&[u8]> = ids.iter().map(NodeId::as_bytes).collect();
        self.kv
            .get_all(&keys)?
            .into_iter()
            .map(|slot| {
                slot.map(|raw| {
                    decode(&raw).map_err(|e| {
                        StoreError::Decode(format!("could not decode cached node: {}", e))
                    })
                })
                .transpose()
            })
            .collect()
    }

    /// Overwrite the entry for `id`. The zero identity is ignored.
    pub fn put(&self, id: &NodeId, descriptor: &NodeDescriptor) -> StoreResult<()> {
        if id.is_zero() {
            debug!("Skipping descriptor without identity");
            return Ok(());
        }

        self.kv.put(id.as_bytes(), encode(descriptor)?)
    }

    /// Write every peer the discovery source has seen. Stops at the first
    /// failing write; entries already written stay. Returns how many
    /// descriptors were written.
    pub fn refresh(&self, discovery: &dyn PeerDiscovery) -> StoreResult<usize> {
        let mut written = 0;

        for (id, descriptor) in discovery.seen() {
            if let Err(e) = self.put(&id, &descriptor) {
                warn!(node = %id, written, error = %e, "Directory refresh aborted");
                return Err(e);
            }
            if !id.is_zero() {
                written += 1;
            }
        }

        info!(written, "Directory cache refreshed");
        Ok(written)
    }

    /// Full-network crawl
    pub fn bootstrap(&self) -> StoreResult<()> {
        Err(StoreError::NotImplemented("directory bootstrap"))
    }

    /// Cache-driven traversal
    pub fn walk(&self) -> StoreResult<()> {
        Err(StoreError::NotImplemented("directory walk"))
    }

    /// Cached descriptors in key order
    pub fn list(&self, limit: usize) -> StoreResult<Vec<NodeDescriptor>> {
        self.kv
            .scan(limit)?
            .into_iter()
            .map(|(_, raw)| decode(&raw))
            .collect()
    }
}
