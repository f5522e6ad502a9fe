//! Node Reputation - reputation and directory subsystem of a storage network
//!
//! Three sibling stores used by the repair pipeline:
//!
//! - **ReputationStore**: per-node audit and uptime counters reduced to
//!   success ratios, and threshold filtering for replacement-target selection
//! - **NodeDirectoryCache**: node identity to last-known network descriptor,
//!   refreshed from peer discovery
//! - **IrreparableSegmentStore**: segments whose repair failed, with an
//!   attempt counter
//!
//! The stores never call each other. Callers reach them through the
//! authenticated service layer, either in-process or over the HTTP API.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/node-reputation/
//! ├── reputation.db          # SQLite (backend = "sqlite")
//! ├── stores.sled/           # sled: directory cache, plus both stores
//! │                          #   when backend = "sled"
//! └── config.toml            # Configuration
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod http;
pub mod identity;
pub mod irreparable;
pub mod kv;
pub mod reputation;
pub mod services;
pub mod stores;

// Re-exports
pub use auth::{ApiKeyValidator, CredentialValidator};
pub use config::{Backend, Config};
pub use directory::{NodeDescriptor, NodeDirectoryCache, PeerDiscovery, StaticPeers};
pub use error::{StoreError, StoreResult};
pub use http::HttpServer;
pub use identity::NodeId;
pub use irreparable::{IrreparableSegment, IrreparableSegmentStore};
pub use reputation::{NodeStats, NodeUpdate, ReputationStore, SelectionCriteria};
pub use services::{EventBus, Services, StoreEvent};
pub use stores::Stores;
