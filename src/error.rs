//! Error types for node-reputation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True for a missing row or key. Callers branch on this instead of
    /// inspecting the message.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, StoreError::Unauthenticated(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Internal(format!("SQLite: {}", e))
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Internal(format!("sled: {}", e))
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Internal(format!("Serialization error: {}", e))
    }
}

/// Result alias used across the crate
pub type StoreResult<T> = Result<T, StoreError>;
