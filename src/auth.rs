//! Caller authentication
//!
//! Every service call carries a credential that is checked before any store
//! is touched. The expected key is handed to the validator at construction;
//! there is no process-wide key.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::StoreError;

/// Accepts or rejects a presented credential
pub trait CredentialValidator: Send + Sync {
    /// `Ok(())` when the credential is acceptable, `Unauthenticated` otherwise
    fn validate(&self, presented: Option<&[u8]>) -> Result<(), StoreError>;
}

/// Shared-secret validator
pub struct ApiKeyValidator {
    expected: Option<[u8; 32]>,
}

impl ApiKeyValidator {
    /// An empty key yields a validator that rejects everything.
    pub fn new(api_key: impl AsRef<[u8]>) -> Self {
        let key = api_key.as_ref();
        let expected = if key.is_empty() {
            None
        } else {
            Some(digest(key))
        };
        Self { expected }
    }
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

impl CredentialValidator for ApiKeyValidator {
    fn validate(&self, presented: Option<&[u8]>) -> Result<(), StoreError> {
        let Some(expected) = self.expected else {
            warn!("Rejecting request: no API key configured");
            return Err(StoreError::Unauthenticated("Invalid API credential".into()));
        };

        match presented {
            // Digests have equal length, so the comparison time doesn't
            // depend on the presented key's length.
            Some(key) if digest(key) == expected => Ok(()),
            _ => {
                warn!("Rejecting request: invalid API credential");
                Err(StoreError::Unauthenticated("Invalid API credential".into()))
            }
        }
    }
}
