//! Opaque event metadata carried into the activity log.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};

/// Caller-supplied key/value map, stored unmodified
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Shape limits applied before any state is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataLimits {
    pub max_keys: usize,
    pub max_key_len: usize,
}

impl Default for MetadataLimits {
    fn default() -> Self {
        Self {
            max_keys: 32,
            max_key_len: 64,
        }
    }
}

/// Reject metadata that is too large or has unusable keys
pub fn validate_metadata(metadata: &Metadata, limits: &MetadataLimits) -> Result<(), DomainError> {
    if metadata.len() > limits.max_keys {
        return Err(DomainError::InvalidMetadata(format!(
            "{} keys exceeds the limit of {}",
            metadata.len(),
            limits.max_keys
        )));
    }

    for key in metadata.keys() {
        if key.trim().is_empty() {
            return Err(DomainError::InvalidMetadata("empty key".to_string()));
        }
        if key.chars().count() > limits.max_key_len {
            return Err(DomainError::InvalidMetadata(format!(
                "key '{}...' longer than {} characters",
                key.chars().take(16).collect::<String>(),
                limits.max_key_len
            )));
        }
    }

    Ok(())
}
