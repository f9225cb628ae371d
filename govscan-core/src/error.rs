use govscan_model::AccountId;
use thiserror::Error;

use crate::config::InvalidConfig;

/// Credential acquisition failures. Always task-fatal, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("access denied assuming role {role} in account {account_id}")]
    AccessDenied { account_id: AccountId, role: String },

    #[error("role {role} not found in account {account_id}")]
    RoleNotFound { account_id: AccountId, role: String },

    #[error("credentials for account {account_id} expired")]
    Expired { account_id: AccountId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Throttled,
    Network,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    AccessDenied,
    MalformedResponse,
    CredentialsExpired,
}

/// Inventory listing failures. Transient errors are retried per page with
/// backoff; permanent errors end the listing immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("transient {kind:?} error: {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("permanent {kind:?} error: {message}")]
    Permanent { kind: PermanentKind, message: String },
}

impl CollectorError {
    pub fn throttled(message: impl Into<String>) -> Self {
        CollectorError::Transient {
            kind: TransientKind::Throttled,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        CollectorError::Transient {
            kind: TransientKind::Network,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        CollectorError::Transient {
            kind: TransientKind::Timeout,
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        CollectorError::Permanent {
            kind: PermanentKind::AccessDenied,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CollectorError::Permanent {
            kind: PermanentKind::MalformedResponse,
            message: message.into(),
        }
    }

    pub fn credentials_expired(message: impl Into<String>) -> Self {
        CollectorError::Permanent {
            kind: PermanentKind::CredentialsExpired,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::Transient { .. })
    }
}

/// Collector error annotated with the number of resources delivered before it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (after {resources_yielded} resources)")]
pub struct CollectorFailure {
    pub error: CollectorError,
    pub resources_yielded: usize,
}

/// A single rule failed on a single resource. Contained by the evaluator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("attribute {path} has unexpected type, expected {expected}")]
    UnexpectedType { path: String, expected: &'static str },

    #[error("rule panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] InvalidConfig),

    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
