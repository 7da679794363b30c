//! Error taxonomy for the recovery subsystem
//!
//! Admin callers get a structured error naming the field or step that failed,
//! plus a coarse [`ErrorKind`] so they can tell "not recoverable from peers"
//! apart from "recoverable, retry later".

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`RecoveryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; never retried, nothing mutated
    Validation,
    /// Missing message, block or token wrapper
    NotFound,
    /// Timeout, connection failure, peer unreachable
    Transport,
    /// Reachable peer answered outside the protocol
    Protocol,
    /// Storage or queue failure
    Internal,
    /// A reconstruction for the same sequence is already executing
    Conflict,
    /// Externally requested cancellation or deadline
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not recoverable: {0}")]
    NotRecoverable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl RecoveryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RecoveryError::Validation(msg.into())
    }

    pub fn decode(what: &'static str, reason: impl Into<String>) -> Self {
        RecoveryError::Decode {
            what,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoveryError::Validation(_) | RecoveryError::Decode { .. } => ErrorKind::Validation,
            RecoveryError::NotFound(_) | RecoveryError::NotRecoverable(_) => ErrorKind::NotFound,
            RecoveryError::Transport(_) | RecoveryError::Timeout(_) => ErrorKind::Transport,
            RecoveryError::Protocol(_) => ErrorKind::Protocol,
            RecoveryError::Internal(_) => ErrorKind::Internal,
            RecoveryError::Conflict(_) => ErrorKind::Conflict,
            RecoveryError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether waiting and calling again may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecoveryError::Transport(_) | RecoveryError::Timeout(_) | RecoveryError::Cancelled
        )
    }
}

/// Storage and queue failures surface as internal errors
impl From<eyre::Report> for RecoveryError {
    fn from(e: eyre::Report) -> Self {
        RecoveryError::Internal(format!("{:#}", e))
    }
}

/// Failure of a single watch cycle. The cycle is aborted without invoking the
/// handler and without advancing the event index.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("event index store failed: {0}")]
    Store(String),

    #[error("confirmed events handler failed: {0}")]
    Handler(String),

    #[error("watch cycle cancelled")]
    Cancelled,
}
