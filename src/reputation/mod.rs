//! Node reputation store
//!
//! Tracks, per storage node, audit and uptime outcomes reduced to success
//! ratios, and filters candidate nodes against ratio thresholds for the
//! repair pipeline's replacement-target selection.
//!
//! ## Invariants
//!
//! - `0 <= success_count <= total_count` for both dimensions, enforced when a
//!   [`RatioCounter`] is constructed (including on decode).
//! - `ratio == success / total` (0 when `total == 0`), recomputed in the same
//!   write that changes the counters.
//! - Counters only grow; rows are never deleted here.
//!
//! Storage is pluggable through [`ReputationBackend`]; see [`sqlite`] and
//! [`sled_tree`] for the two engines.

pub mod sled_tree;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::identity::NodeId;

/// Default upper bound on the candidate list accepted by [`ReputationStore::find_valid_nodes`]
pub const DEFAULT_MAX_CANDIDATES: usize = 1000;

// ============================================================================
// Counters
// ============================================================================

/// Success/total pair with its derived ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCounter")]
pub struct RatioCounter {
    success_count: i64,
    total_count: i64,
    ratio: f64,
}

#[derive(Deserialize)]
struct RawCounter {
    success_count: i64,
    total_count: i64,
    #[serde(default)]
    #[allow(dead_code)]
    ratio: f64,
}

impl TryFrom<RawCounter> for RatioCounter {
    type Error = StoreError;

    fn try_from(raw: RawCounter) -> Result<Self, Self::Error> {
        RatioCounter::new(raw.success_count, raw.total_count)
    }
}

impl RatioCounter {
    pub const ZERO: RatioCounter = RatioCounter {
        success_count: 0,
        total_count: 0,
        ratio: 0.0,
    };

    /// Validate a counter pair and derive its ratio
    pub fn new(success_count: i64, total_count: i64) -> StoreResult<Self> {
        if success_count < 0 {
            return Err(StoreError::Validation("success count less than 0".into()));
        }
        if total_count < 0 {
            return Err(StoreError::Validation("total count less than 0".into()));
        }
        if success_count > total_count {
            return Err(StoreError::Validation(
                "success count greater than total count".into(),
            ));
        }
        Ok(Self {
            success_count,
            total_count,
            ratio: ratio_of(success_count, total_count),
        })
    }

    pub fn success_count(&self) -> i64 {
        self.success_count
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Counter after one more outcome. Fails once the total can't grow.
    pub fn record(self, success: bool) -> StoreResult<Self> {
        let total_count = self
            .total_count
            .checked_add(1)
            .ok_or_else(|| StoreError::Validation("counter overflow".into()))?;
        // success_count <= total_count, so this can't overflow
        let success_count = self.success_count + i64::from(success);
        Ok(Self {
            success_count,
            total_count,
            ratio: ratio_of(success_count, total_count),
        })
    }
}

/// `success / total`, or 0 for an empty counter
pub fn ratio_of(success_count: i64, total_count: i64) -> f64 {
    if total_count > 0 {
        success_count as f64 / total_count as f64
    } else {
        0.0
    }
}

// ============================================================================
// Records and requests
// ============================================================================

/// Reputation statistics for one storage node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub id: NodeId,
    pub audit: RatioCounter,
    pub uptime: RatioCounter,
    pub created_at: DateTime<Utc>,
}

impl NodeStats {
    /// Fresh all-zero stats
    pub fn zero(id: NodeId) -> Self {
        Self {
            id,
            audit: RatioCounter::ZERO,
            uptime: RatioCounter::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Stats after applying the requested outcomes; `None` leaves a dimension alone
    pub fn with_outcomes(&self, audit: Option<bool>, uptime: Option<bool>) -> StoreResult<Self> {
        let mut next = self.clone();
        if let Some(success) = audit {
            next.audit = next.audit.record(success)?;
        }
        if let Some(is_up) = uptime {
            next.uptime = next.uptime.record(is_up)?;
        }
        Ok(next)
    }
}

/// Initial counters supplied to [`ReputationStore::create`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStats {
    #[serde(default)]
    pub audit_success_count: i64,
    #[serde(default)]
    pub total_audit_count: i64,
    #[serde(default)]
    pub uptime_success_count: i64,
    #[serde(default)]
    pub total_uptime_count: i64,
}

/// One node's outcomes for [`ReputationStore::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeUpdate {
    pub id: NodeId,
    pub update_audit: bool,
    pub audit_success: bool,
    pub update_uptime: bool,
    pub is_up: bool,
}

impl NodeUpdate {
    fn audit_outcome(&self) -> Option<bool> {
        self.update_audit.then_some(self.audit_success)
    }

    fn uptime_outcome(&self) -> Option<bool> {
        self.update_uptime.then_some(self.is_up)
    }
}

/// Wire form of a batch entry; the id is parsed per entry so one malformed
/// entry fails alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdateRequest {
    pub node_id: String,
    #[serde(default)]
    pub update_audit: bool,
    #[serde(default)]
    pub audit_success: bool,
    #[serde(default)]
    pub update_uptime: bool,
    #[serde(default)]
    pub is_up: bool,
}

impl NodeUpdateRequest {
    pub fn parse(&self) -> StoreResult<NodeUpdate> {
        Ok(NodeUpdate {
            id: self.node_id.parse()?,
            update_audit: self.update_audit,
            audit_success: self.audit_success,
            update_uptime: self.update_uptime,
            is_up: self.is_up,
        })
    }
}

impl From<NodeUpdate> for NodeUpdateRequest {
    fn from(update: NodeUpdate) -> Self {
        Self {
            node_id: update.id.to_hex(),
            update_audit: update.update_audit,
            audit_success: update.audit_success,
            update_uptime: update.update_uptime,
            is_up: update.is_up,
        }
    }
}

/// A batch entry that could not be applied
#[derive(Debug, Clone, Serialize)]
pub struct FailedUpdate {
    pub node: NodeUpdateRequest,
    pub error: String,
}

/// Result of [`ReputationStore::update_batch`]; partial failure lives here,
/// never in an aggregate error
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub stats: Vec<NodeStats>,
    pub failed: Vec<FailedUpdate>,
    /// Nodes this batch created
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<NodeId>,
}

/// Stats returned by an operation that may have created the node
#[derive(Debug, Clone, PartialEq)]
pub struct Ensured {
    pub stats: NodeStats,
    pub created: bool,
}

/// Thresholds for node selection; all three must hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    #[serde(default)]
    pub min_audit_count: i64,
    #[serde(default)]
    pub min_audit_ratio: f64,
    #[serde(default)]
    pub min_uptime_ratio: f64,
}

impl SelectionCriteria {
    pub fn accepts(&self, stats: &NodeStats) -> bool {
        stats.audit.total_count() >= self.min_audit_count
            && stats.audit.ratio() >= self.min_audit_ratio
            && stats.uptime.ratio() >= self.min_uptime_ratio
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Storage capabilities the reputation store needs from an engine
pub trait ReputationBackend: Send + Sync {
    /// Insert unless a row for the id exists. Returns whether it inserted.
    fn insert_if_absent(&self, stats: &NodeStats) -> StoreResult<bool>;

    fn get(&self, id: &NodeId) -> StoreResult<Option<NodeStats>>;

    /// Atomically apply outcomes to an existing row, recomputing ratios in
    /// the same write. `None` when the row doesn't exist.
    fn record_outcomes(
        &self,
        id: &NodeId,
        audit: Option<bool>,
        uptime: Option<bool>,
    ) -> StoreResult<Option<NodeStats>>;

    /// Ids among `candidates` (already deduplicated) whose stats pass `criteria`
    fn find_valid(
        &self,
        candidates: &[NodeId],
        criteria: &SelectionCriteria,
    ) -> StoreResult<Vec<NodeId>>;

    /// Rows ordered by id
    fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<NodeStats>>;
}

// ============================================================================
// Store
// ============================================================================

/// Per-node audit/uptime statistics
pub struct ReputationStore {
    backend: Arc<dyn ReputationBackend>,
    max_candidates: usize,
}

impl ReputationStore {
    pub fn new(backend: Arc<dyn ReputationBackend>) -> Self {
        Self {
            backend,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Insert a new node. Counters are validated before anything is written.
    pub fn create(&self, id: NodeId, initial: Option<InitialStats>) -> StoreResult<NodeStats> {
        let initial = initial.unwrap_or_default();
        let audit = RatioCounter::new(initial.audit_success_count, initial.total_audit_count)
            .map_err(|e| StoreError::Validation(format!("audit: {}", e)))?;
        let uptime = RatioCounter::new(initial.uptime_success_count, initial.total_uptime_count)
            .map_err(|e| StoreError::Validation(format!("uptime: {}", e)))?;

        let stats = NodeStats {
            id,
            audit,
            uptime,
            created_at: Utc::now(),
        };

        if !self.backend.insert_if_absent(&stats)? {
            return Err(StoreError::AlreadyExists(format!("node {}", id)));
        }

        debug!(node = %id, "Created node stats");
        Ok(stats)
    }

    pub fn get(&self, id: &NodeId) -> StoreResult<NodeStats> {
        self.backend
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("node {}", id)))
    }

    /// Existing stats, or freshly created zero stats. Concurrent first-time
    /// callers all succeed; exactly one of them inserts.
    pub fn create_entry_if_not_exists(&self, id: &NodeId) -> StoreResult<NodeStats> {
        self.ensure_entry(id).map(|ensured| ensured.stats)
    }

    /// Like [`create_entry_if_not_exists`](Self::create_entry_if_not_exists),
    /// also saying whether this call inserted the row
    pub fn ensure_entry(&self, id: &NodeId) -> StoreResult<Ensured> {
        if let Some(stats) = self.backend.get(id)? {
            return Ok(Ensured { stats, created: false });
        }

        let created = self.backend.insert_if_absent(&NodeStats::zero(*id))?;
        if created {
            debug!(node = %id, "Created node stats on first use");
        }

        let stats = self.backend.get(id)?.ok_or_else(|| {
            StoreError::Internal(format!("node {} missing right after insert", id))
        })?;
        Ok(Ensured { stats, created })
    }

    /// Record outcomes for the requested dimensions, creating the node first
    /// if needed
    pub fn update(&self, update: &NodeUpdate) -> StoreResult<NodeStats> {
        self.apply_update(update).map(|ensured| ensured.stats)
    }

    /// [`update`](Self::update), reporting whether the node was created on
    /// the way
    pub fn apply_update(&self, update: &NodeUpdate) -> StoreResult<Ensured> {
        let current = self.ensure_entry(&update.id)?;

        let (audit, uptime) = (update.audit_outcome(), update.uptime_outcome());
        if audit.is_none() && uptime.is_none() {
            return Ok(current);
        }

        let stats = self
            .backend
            .record_outcomes(&update.id, audit, uptime)?
            .ok_or_else(|| StoreError::NotFound(format!("node {}", update.id)))?;
        Ok(Ensured {
            stats,
            created: current.created,
        })
    }

    /// Record one uptime check. The node must already exist.
    pub fn update_uptime(&self, id: &NodeId, is_up: bool) -> StoreResult<NodeStats> {
        self.backend
            .record_outcomes(id, None, Some(is_up))?
            .ok_or_else(|| StoreError::NotFound(format!("node {}", id)))
    }

    /// Record one audit. The node must already exist.
    pub fn update_audit_success(&self, id: &NodeId, success: bool) -> StoreResult<NodeStats> {
        self.backend
            .record_outcomes(id, Some(success), None)?
            .ok_or_else(|| StoreError::NotFound(format!("node {}", id)))
    }

    /// Apply [`update`](Self::update) to each entry in order. A failing entry
    /// is collected and processing continues.
    pub fn update_batch(&self, nodes: &[NodeUpdateRequest]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for request in nodes {
            match request.parse().and_then(|update| self.apply_update(&update)) {
                Ok(Ensured { stats, created }) => {
                    if created {
                        outcome.created.push(stats.id);
                    }
                    outcome.stats.push(stats);
                }
                Err(e) => {
                    warn!(node = %request.node_id, error = %e, "Batch update failed for node");
                    outcome.failed.push(FailedUpdate {
                        node: request.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            succeeded = outcome.stats.len(),
            failed = outcome.failed.len(),
            "Processed update batch"
        );
        outcome
    }

    /// Candidates whose stats satisfy every threshold. Unknown ids are
    /// skipped. Order is unspecified.
    pub fn find_valid_nodes(
        &self,
        candidates: &[NodeId],
        criteria: &SelectionCriteria,
    ) -> StoreResult<Vec<NodeId>> {
        if candidates.len() > self.max_candidates {
            return Err(StoreError::Validation(format!(
                "too many candidates: {} (max {})",
                candidates.len(),
                self.max_candidates
            )));
        }

        let unique: Vec<NodeId> = candidates
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let passed = self.backend.find_valid(&unique, criteria)?;
        debug!(candidates = unique.len(), passed = passed.len(), "Filtered candidate nodes");
        Ok(passed)
    }

    /// Read-only scan for diagnostics
    pub fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<NodeStats>> {
        self.backend.list(limit, offset)
    }
}
