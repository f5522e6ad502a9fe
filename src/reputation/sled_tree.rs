//! sled reputation backend
//!
//! Values are MessagePack-encoded [`NodeStats`] keyed by the raw node id.
//! Every write is a compare-and-swap against the bytes that were read, so
//! concurrent increments retry instead of overwriting each other.

use tracing::trace;

use super::{NodeStats, ReputationBackend, SelectionCriteria};
use crate::error::{StoreError, StoreResult};
use crate::identity::NodeId;
use crate::kv::{decode, encode, SledDb, NODES_TREE};

/// Reputation entries in the `nodes` tree
pub struct SledReputation {
    tree: sled::Tree,
}

impl SledReputation {
    pub fn open(db: &SledDb) -> StoreResult<Self> {
        Ok(Self {
            tree: db.tree(NODES_TREE)?,
        })
    }
}

impl ReputationBackend for SledReputation {
    fn insert_if_absent(&self, stats: &NodeStats) -> StoreResult<bool> {
        let bytes = encode(stats)?;
        let swapped = self
            .tree
            .compare_and_swap(stats.id.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    fn get(&self, id: &NodeId) -> StoreResult<Option<NodeStats>> {
        self.tree
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn record_outcomes(
        &self,
        id: &NodeId,
        audit: Option<bool>,
        uptime: Option<bool>,
    ) -> StoreResult<Option<NodeStats>> {
        let mut attempts = 0u32;
        loop {
            let current = match self.tree.get(id.as_bytes())? {
                Some(raw) => raw,
                None => return Ok(None),
            };

            let stats: NodeStats = decode(&current)?;
            let next = stats.with_outcomes(audit, uptime)?;
            let bytes = encode(&next)?;

            match self
                .tree
                .compare_and_swap(id.as_bytes(), Some(&current), Some(bytes))?
            {
                Ok(()) => return Ok(Some(next)),
                Err(_) => {
                    attempts += 1;
                    trace!(node = %id, attempts, "Lost increment race, retrying");
                }
            }
        }
    }

    fn find_valid(
        &self,
        candidates: &[NodeId],
        criteria: &SelectionCriteria,
    ) -> StoreResult<Vec<NodeId>> {
        let mut passed = Vec::new();
        for id in candidates {
            if let Some(stats) = self.get(id)? {
                if criteria.accepts(&stats) {
                    passed.push(*id);
                }
            }
        }
        Ok(passed)
    }

    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<NodeStats>> {
        self.tree
            .iter()
            .skip(offset)
            .take(limit)
            .map(|entry| -> StoreResult<_> {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }
}
