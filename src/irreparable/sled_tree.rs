//! sled irreparable-segment backend
//!
//! Keyed by the raw segment path, so iteration order matches the SQLite
//! backend's `ORDER BY segment_path`.

use super::{attempt_overflow, IrreparableBackend, IrreparableSegment};
use crate::error::StoreResult;
use crate::kv::{decode, encode, SledDb, IRREPARABLE_TREE};

pub struct SledIrreparable {
    tree: sled::Tree,
}

impl SledIrreparable {
    pub fn open(db: &SledDb) -> StoreResult<Self> {
        Ok(Self {
            tree: db.tree(IRREPARABLE_TREE)?,
        })
    }
}

impl IrreparableBackend for SledIrreparable {
    fn increment_repair_attempts(
        &self,
        segment: &IrreparableSegment,
    ) -> StoreResult<IrreparableSegment> {
        let key = segment.segment_path.as_slice();
        loop {
            let current = self.tree.get(key)?;
            let next = match &current {
                Some(raw) => {
                    let mut stored: IrreparableSegment = decode(raw)?;
                    stored.repair_attempt_count = stored
                        .repair_attempt_count
                        .checked_add(1)
                        .ok_or_else(|| attempt_overflow(key))?;
                    stored
                }
                None => segment.clone(),
            };

            if self
                .tree
                .compare_and_swap(key, current, Some(encode(&next)?))?
                .is_ok()
            {
                return Ok(next);
            }
        }
    }

    fn get(&self, segment_path: &[u8]) -> StoreResult<Option<IrreparableSegment>> {
        self.tree
            .get(segment_path)?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn delete(&self, segment_path: &[u8]) -> StoreResult<bool> {
        Ok(self.tree.remove(segment_path)?.is_some())
    }

    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<IrreparableSegment>> {
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
