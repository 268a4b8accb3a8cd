//! Error types for reward processing.

use lumen_shared::{DomainError, UserId};
use thiserror::Error;

/// Storage-layer failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("user {0} already has a game profile")]
    DuplicateProfile(UserId),

    #[error("game profile for user {0} disappeared mid-transaction")]
    MissingProfile(UserId),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("transaction cancelled before commit")]
    Cancelled,

    #[error("transaction deadline exceeded before commit")]
    DeadlineExceeded,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Caller-facing classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; never mutates state
    Client,
    NotFound,
    /// Another request for the same user holds the lock; retry later
    Contention,
    /// Storage failure; fully rolled back
    Server,
}

/// Errors surfaced at the coordinator boundary
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("malformed metadata: {0}")]
    InvalidMetadata(String),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("request already in progress for user {0}")]
    InProgress(UserId),

    #[error("reward request cancelled")]
    Cancelled,

    #[error("reward engine misconfigured: {0}")]
    Misconfigured(String),

    #[error("reward persistence failed: {0}")]
    Persistence(#[source] StoreError),
}

impl From<DomainError> for RewardError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidEvent(name) => Self::InvalidEvent(name),
            DomainError::InvalidMetadata(reason) => Self::InvalidMetadata(reason),
            other => Self::Misconfigured(other.to_string()),
        }
    }
}

impl From<StoreError> for RewardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Persistence(other),
        }
    }
}

impl RewardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEvent(_) | Self::InvalidMetadata(_) => ErrorKind::Client,
            Self::UserNotFound(_) => ErrorKind::NotFound,
            Self::InProgress(_) => ErrorKind::Contention,
            Self::Cancelled | Self::Misconfigured(_) | Self::Persistence(_) => ErrorKind::Server,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::InvalidMetadata(_) => "INVALID_METADATA",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::InProgress(_) => "IN_PROGRESS",
            Self::Cancelled => "CANCELLED",
            Self::Misconfigured(_) => "MISCONFIGURED",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
        }
    }

    /// HTTP-style status for the web layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidEvent(_) | Self::InvalidMetadata(_) => 400,
            Self::UserNotFound(_) => 404,
            Self::InProgress(_) => 409,
            Self::Cancelled => 503,
            Self::Misconfigured(_) | Self::Persistence(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InProgress(_) | Self::Cancelled)
    }

    /// Message safe to show a user. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidEvent(_) => "invalid event".to_string(),
            Self::InvalidMetadata(reason) => format!("invalid metadata: {}", reason),
            Self::UserNotFound(_) => "user not found".to_string(),
            Self::InProgress(_) => "request already in progress, please wait".to_string(),
            Self::Cancelled => "request cancelled, please try again".to_string(),
            Self::Misconfigured(_) | Self::Persistence(_) => "internal server error".to_string(),
        }
    }
}
