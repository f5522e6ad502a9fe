//! Irreparable segment service - authenticated access to segment bookkeeping

use std::sync::Arc;

use crate::auth::CredentialValidator;
use crate::error::StoreError;
use crate::irreparable::{IrreparableSegment, IrreparableSegmentStore};

use super::events::{EventBus, StoreEvent};

pub struct IrreparableService {
    store: Arc<IrreparableSegmentStore>,
    auth: Arc<dyn CredentialValidator>,
    events: Arc<EventBus>,
}

impl IrreparableService {
    pub fn new(
        store: Arc<IrreparableSegmentStore>,
        auth: Arc<dyn CredentialValidator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            auth,
            events,
        }
    }

    pub fn increment_repair_attempts(
        &self,
        credential: Option<&[u8]>,
        segment: &IrreparableSegment,
    ) -> Result<IrreparableSegment, StoreError> {
        self.auth.validate(credential)?;
        let stored = self.store.increment_repair_attempts(segment)?;
        self.events.emit(StoreEvent::SegmentAttemptRecorded {
            segment: hex::encode(&stored.segment_path),
            attempts: stored.repair_attempt_count,
        });
        Ok(stored)
    }

    /// Same upsert as [`increment_repair_attempts`](Self::increment_repair_attempts),
    /// under the name older repair clients call
    pub fn put(
        &self,
        credential: Option<&[u8]>,
        segment: &IrreparableSegment,
    ) -> Result<IrreparableSegment, StoreError> {
        self.increment_repair_attempts(credential, segment)
    }

    pub fn get(
        &self,
        credential: Option<&[u8]>,
        segment_path: &[u8],
    ) -> Result<IrreparableSegment, StoreError> {
        self.auth.validate(credential)?;
        self.store.get(segment_path)
    }

    pub fn delete(&self, credential: Option<&[u8]>, segment_path: &[u8]) -> Result<bool, StoreError> {
        self.auth.validate(credential)?;
        let removed = self.store.delete(segment_path)?;
        self.events.emit(StoreEvent::SegmentDeleted {
            segment: hex::encode(segment_path),
            removed,
        });
        Ok(removed)
    }

    pub fn list(
        &self,
        credential: Option<&[u8]>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IrreparableSegment>, StoreError> {
        self.auth.validate(credential)?;
        self.store.list(limit, offset)
    }
}
