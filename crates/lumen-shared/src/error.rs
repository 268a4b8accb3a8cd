//! Error types for the pure reward domain.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("malformed metadata: {0}")]
    InvalidMetadata(String),

    #[error("no base XP configured for event {0}")]
    MissingBaseXp(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
