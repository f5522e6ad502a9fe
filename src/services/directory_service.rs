//! Directory service - authenticated access to the node directory cache

use std::sync::Arc;

use crate::auth::CredentialValidator;
use crate::directory::{NodeDescriptor, NodeDirectoryCache, PeerDiscovery};
use crate::error::StoreError;
use crate::identity::NodeId;

use super::events::{EventBus, StoreEvent};

pub struct DirectoryService {
    cache: Arc<NodeDirectoryCache>,
    auth: Arc<dyn CredentialValidator>,
    events: Arc<EventBus>,
}

impl DirectoryService {
    pub fn new(
        cache: Arc<NodeDirectoryCache>,
        auth: Arc<dyn CredentialValidator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            cache,
            auth,
            events,
        }
    }

    pub fn get(
        &self,
        credential: Option<&[u8]>,
        id: &NodeId,
    ) -> Result<Option<NodeDescriptor>, StoreError> {
        self.auth.validate(credential)?;
        self.cache.get(id)
    }

    pub fn get_all(
        &self,
        credential: Option<&[u8]>,
        ids: &[NodeId],
    ) -> Result<Vec<Option<NodeDescriptor>>, StoreError> {
        self.auth.validate(credential)?;
        self.cache.get_all(ids)
    }

    pub fn put(
        &self,
        credential: Option<&[u8]>,
        id: &NodeId,
        descriptor: &NodeDescriptor,
    ) -> Result<(), StoreError> {
        self.auth.validate(credential)?;
        self.cache.put(id, descriptor)?;
        if !id.is_zero() {
            self.events.emit(StoreEvent::DescriptorCached { id: id.to_hex() });
        }
        Ok(())
    }

    pub fn refresh(
        &self,
        credential: Option<&[u8]>,
        discovery: &dyn PeerDiscovery,
    ) -> Result<usize, StoreError> {
        self.auth.validate(credential)?;
        let written = self.cache.refresh(discovery)?;
        self.events.emit(StoreEvent::DirectoryRefreshed { written });
        Ok(written)
    }

    pub fn bootstrap(&self, credential: Option<&[u8]>) -> Result<(), StoreError> {
        self.auth.validate(credential)?;
        self.cache.bootstrap()
    }

    pub fn walk(&self, credential: Option<&[u8]>) -> Result<(), StoreError> {
        self.auth.validate(credential)?;
        self.cache.walk()
    }

    pub fn list(
        &self,
        credential: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<NodeDescriptor>, StoreError> {
        self.auth.validate(credential)?;
        self.cache.list(limit)
    }
}
