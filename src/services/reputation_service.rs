//! Reputation service - authenticated access to the reputation store

use std::sync::Arc;

use crate::auth::CredentialValidator;
use crate::error::StoreError;
use crate::identity::NodeId;
use crate::reputation::{
    BatchOutcome, Ensured, InitialStats, NodeStats, NodeUpdate, NodeUpdateRequest, ReputationStore,
    SelectionCriteria,
};

use super::events::{EventBus, StoreEvent};

/// Reputation operations, each gated on the caller's credential
pub struct ReputationService {
    store: Arc<ReputationStore>,
    auth: Arc<dyn CredentialValidator>,
    events: Arc<EventBus>,
}

impl ReputationService {
    pub fn new(
        store: Arc<ReputationStore>,
        auth: Arc<dyn CredentialValidator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            auth,
            events,
        }
    }

    fn emit_updated(&self, stats: &NodeStats) {
        self.events.emit(StoreEvent::StatsUpdated {
            id: stats.id.to_hex(),
            audit_ratio: stats.audit.ratio(),
            uptime_ratio: stats.uptime.ratio(),
        });
    }

    fn emit_created_if(&self, ensured: &Ensured) {
        if ensured.created {
            self.events.emit(StoreEvent::NodeCreated {
                id: ensured.stats.id.to_hex(),
            });
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, credential: Option<&[u8]>, id: &NodeId) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        self.store.get(id)
    }

    pub fn find_valid_nodes(
        &self,
        credential: Option<&[u8]>,
        candidates: &[NodeId],
        criteria: &SelectionCriteria,
    ) -> Result<Vec<NodeId>, StoreError> {
        self.auth.validate(credential)?;
        self.store.find_valid_nodes(candidates, criteria)
    }

    pub fn list(
        &self,
        credential: Option<&[u8]>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NodeStats>, StoreError> {
        self.auth.validate(credential)?;
        self.store.list(limit, offset)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(
        &self,
        credential: Option<&[u8]>,
        id: NodeId,
        initial: Option<InitialStats>,
    ) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        let stats = self.store.create(id, initial)?;
        self.events.emit(StoreEvent::NodeCreated { id: id.to_hex() });
        Ok(stats)
    }

    pub fn create_entry_if_not_exists(
        &self,
        credential: Option<&[u8]>,
        id: &NodeId,
    ) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        let ensured = self.store.ensure_entry(id)?;
        self.emit_created_if(&ensured);
        Ok(ensured.stats)
    }

    pub fn update(
        &self,
        credential: Option<&[u8]>,
        update: &NodeUpdate,
    ) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        let ensured = self.store.apply_update(update)?;
        self.emit_created_if(&ensured);
        self.emit_updated(&ensured.stats);
        Ok(ensured.stats)
    }

    pub fn update_uptime(
        &self,
        credential: Option<&[u8]>,
        id: &NodeId,
        is_up: bool,
    ) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        let stats = self.store.update_uptime(id, is_up)?;
        self.emit_updated(&stats);
        Ok(stats)
    }

    pub fn update_audit_success(
        &self,
        credential: Option<&[u8]>,
        id: &NodeId,
        success: bool,
    ) -> Result<NodeStats, StoreError> {
        self.auth.validate(credential)?;
        let stats = self.store.update_audit_success(id, success)?;
        self.emit_updated(&stats);
        Ok(stats)
    }

    /// Only authentication fails the call as a whole; per-node failures are
    /// in the outcome.
    pub fn update_batch(
        &self,
        credential: Option<&[u8]>,
        nodes: &[NodeUpdateRequest],
    ) -> Result<BatchOutcome, StoreError> {
        self.auth.validate(credential)?;
        let outcome = self.store.update_batch(nodes);
        for id in &outcome.created {
            self.events.emit(StoreEvent::NodeCreated { id: id.to_hex() });
        }
        self.events.emit(StoreEvent::BatchProcessed {
            succeeded: outcome.stats.len(),
            failed: outcome.failed.len(),
        });
        Ok(outcome)
    }
}
