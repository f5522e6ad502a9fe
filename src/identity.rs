//! Node identity
//!
//! Storage nodes are identified by an opaque 32-byte value. The all-zero
//! value is a sentinel meaning "no identity" (a bootstrap peer that has not
//! announced itself yet) and is never stored in the directory cache.
//!
//! Identities travel as lowercase hex over the HTTP API and as raw bytes in
//! every backing store.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Length of a node identity in bytes
pub const NODE_ID_LEN: usize = 32;

/// Fixed-length storage node identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// The "no identity" sentinel
    pub const ZERO: NodeId = NodeId([0u8; NODE_ID_LEN]);

    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an identity from a raw slice, rejecting the wrong length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let arr: [u8; NODE_ID_LEN] = bytes.try_into().map_err(|_| {
            StoreError::Validation(format!(
                "node id must be {} bytes, got {}",
                NODE_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for NodeId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| StoreError::Validation(format!("invalid node id '{}': {}", s, e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
