//! Service layer for node-reputation
//!
//! Services sit between the HTTP handlers and the stores. Each one:
//! - validates the caller's credential before touching its store
//! - emits a [`StoreEvent`] after successful writes
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (auth + events)
//!     ↓
//! Stores (reputation, directory, irreparable)
//!     ↓
//! SQLite / sled
//! ```

pub mod directory_service;
pub mod events;
pub mod irreparable_service;
pub mod reputation_service;
pub mod response;

pub use directory_service::DirectoryService;
pub use events::{spawn_logging_listener, EventBus, EventListener, StoreEvent};
pub use irreparable_service::IrreparableService;
pub use reputation_service::ReputationService;

use std::sync::Arc;

use crate::auth::CredentialValidator;
use crate::error::StoreResult;
use crate::stores::Stores;

/// Service container handed to the HTTP server
pub struct Services {
    pub reputation: Arc<ReputationService>,
    pub directory: Arc<DirectoryService>,
    pub irreparable: Arc<IrreparableService>,
    pub events: Arc<EventBus>,
    auth: Arc<dyn CredentialValidator>,
}

impl Services {
    /// Wire every service to its store with a shared validator and event bus
    pub fn new(stores: &Stores, auth: Arc<dyn CredentialValidator>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            reputation: Arc::new(ReputationService::new(
                stores.reputation.clone(),
                auth.clone(),
                events.clone(),
            )),
            directory: Arc::new(DirectoryService::new(
                stores.directory.clone(),
                auth.clone(),
                events.clone(),
            )),
            irreparable: Arc::new(IrreparableService::new(
                stores.irreparable.clone(),
                auth.clone(),
                events.clone(),
            )),
            events,
            auth,
        }
    }

    /// Check a credential without touching any store
    pub fn authenticate(&self, credential: Option<&[u8]>) -> StoreResult<()> {
        self.auth.validate(credential)
    }
}
