//! Peer discovery sources for directory refresh

use crate::identity::NodeId;

use super::NodeDescriptor;

/// Whatever peer set the discovery layer currently knows about
pub trait PeerDiscovery: Send + Sync {
    fn seen(&self) -> Vec<(NodeId, NodeDescriptor)>;
}

/// Fixed peer list, typically the configured seed nodes
#[derive(Debug, Clone, Default)]
pub struct StaticPeers {
    peers: Vec<NodeDescriptor>,
}

impl StaticPeers {
    pub fn new(peers: Vec<NodeDescriptor>) -> Self {
        Self { peers }
    }
}

impl PeerDiscovery for StaticPeers {
    fn seen(&self) -> Vec<(NodeId, NodeDescriptor)> {
        self.peers.iter().map(|d| (d.id, d.clone())).collect()
    }
}
