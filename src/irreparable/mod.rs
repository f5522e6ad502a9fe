//! Irreparable segment bookkeeping
//!
//! One record per segment path the repair pipeline gave up on. The first
//! [`IrreparableSegmentStore::increment_repair_attempts`] for a path inserts
//! the record as given; every later call bumps `repair_attempt_count` by one
//! and leaves the rest of the row as first written.

pub mod sled_tree;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// A segment whose repair could not restore the required redundancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrreparableSegment {
    /// Opaque key derived from the encrypted logical path
    #[serde(with = "hex_bytes")]
    pub segment_path: Vec<u8>,
    /// Opaque snapshot of the segment pointer
    #[serde(with = "hex_bytes", default)]
    pub segment_detail: Vec<u8>,
    #[serde(default)]
    pub lost_pieces_count: i64,
    #[serde(default)]
    pub damaged_at_unix_sec: i64,
    #[serde(default)]
    pub repair_attempt_count: i64,
}

impl IrreparableSegment {
    fn validate(&self) -> StoreResult<()> {
        if self.segment_path.is_empty() {
            return Err(StoreError::Validation("segment path is empty".into()));
        }
        if self.lost_pieces_count < 0 {
            return Err(StoreError::Validation("lost pieces count less than 0".into()));
        }
        if self.repair_attempt_count < 0 {
            return Err(StoreError::Validation(
                "repair attempt count less than 0".into(),
            ));
        }
        Ok(())
    }
}

/// The stored attempt count is already at `i64::MAX`
pub(crate) fn attempt_overflow(segment_path: &[u8]) -> StoreError {
    StoreError::Validation(format!(
        "repair attempt count overflow for segment {}",
        hex::encode(segment_path)
    ))
}

/// Segment paths travel as lowercase hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Storage capabilities the segment store needs from an engine
pub trait IrreparableBackend: Send + Sync {
    /// Insert the record, or add one to the stored attempt count if the path
    /// exists. One atomic step either way. Returns the row as stored.
    fn increment_repair_attempts(
        &self,
        segment: &IrreparableSegment,
    ) -> StoreResult<IrreparableSegment>;

    fn get(&self, segment_path: &[u8]) -> StoreResult<Option<IrreparableSegment>>;

    /// Whether a row was removed
    fn delete(&self, segment_path: &[u8]) -> StoreResult<bool>;

    /// Rows ordered by segment path
    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<IrreparableSegment>>;
}

pub struct IrreparableSegmentStore {
    backend: Arc<dyn IrreparableBackend>,
}

impl IrreparableSegmentStore {
    pub fn new(backend: Arc<dyn IrreparableBackend>) -> Self {
        Self { backend }
    }

    pub fn increment_repair_attempts(
        &self,
        segment: &IrreparableSegment,
    ) -> StoreResult<IrreparableSegment> {
        segment.validate()?;
        let stored = self.backend.increment_repair_attempts(segment)?;
        debug!(
            segment = %hex::encode(&stored.segment_path),
            attempts = stored.repair_attempt_count,
            "Recorded repair attempt"
        );
        Ok(stored)
    }

    pub fn get(&self, segment_path: &[u8]) -> StoreResult<IrreparableSegment> {
        self.backend
            .get(segment_path)?
            .ok_or_else(|| StoreError::NotFound(format!("segment {}", hex::encode(segment_path))))
    }

    /// Remove a segment. Deleting an absent path succeeds; the flag says
    /// whether anything was there.
    pub fn delete(&self, segment_path: &[u8]) -> StoreResult<bool> {
        let removed = self.backend.delete(segment_path)?;
        debug!(segment = %hex::encode(segment_path), removed, "Deleted segment");
        Ok(removed)
    }

    pub fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<IrreparableSegment>> {
        self.backend.list(limit, offset)
    }
}
