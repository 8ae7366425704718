// src/core/error.rs

//! Error taxonomy of the engine.
//!
//! Validation errors are raised before any probing starts. Probe errors are
//! folded into negative outcomes at the probe boundary. Storage and scan
//! errors are what the orchestrator turns into a FAILED scan.

use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use thiserror::Error;

use crate::core::models::{ResultCategory, ScanId, ScanStatus, Severity};

/// Malformed input, rejected synchronously.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid target: {0:?}")]
    InvalidTarget(String),

    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    #[error("depth must be between 1 and 5, got {0}")]
    InvalidDepth(u8),

    #[error("invalid port specification {spec:?}: {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    #[error("speed must be between 1 and 5, got {0}")]
    InvalidSpeed(u8),

    #[error("invalid extension {0:?}")]
    InvalidExtension(String),

    #[error("invalid status filter {0:?}")]
    InvalidStatusFilter(String),

    #[error("wordlist 'custom' requires a non-empty list of custom prefixes")]
    MissingCustomWordlist,

    #[error("subdomain enumeration needs a domain, got IP literal {0}")]
    NotADomain(String),
}

/// Transport-level failure of a single probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout } else { Self::Http(e) }
    }
}

impl From<ResolveError> for ProbeError {
    fn from(e: ResolveError) -> Self {
        match e.kind() {
            ResolveErrorKind::Timeout => Self::Timeout,
            _ => Self::Dns(e.to_string()),
        }
    }
}

/// Failures of the storage gateway.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("scan {0} not found")]
    ScanNotFound(ScanId),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("severity {severity:?} not allowed for category {category}")]
    SeverityMismatch {
        category: ResultCategory,
        severity: Option<Severity>,
    },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from strategies and the orchestrator.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("probe setup failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    #[error("all phases of the {0} strategy failed")]
    AllPhasesFailed(&'static str),

    #[error("invalid signature catalog: {0}")]
    Signatures(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("scan was cancelled")]
    Cancelled,

    #[error("scan worker aborted: {0}")]
    WorkerAborted(String),
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_timeouts_become_probe_timeouts() {
        let timeout = ResolveError::from(ResolveErrorKind::Timeout);
        assert!(matches!(ProbeError::from(timeout), ProbeError::Timeout));

        let other = ResolveError::from(ResolveErrorKind::Message("no connections available"));
        assert!(matches!(ProbeError::from(other), ProbeError::Dns(_)));
    }
}
