// src/core/storage/mod.rs

//! Storage gateway: keyed persistence for scans and their findings.
//!
//! The orchestrator is the only writer. Both adapters enforce the same
//! contract: status transitions are monotonic, the completion timestamp is set
//! exactly when a terminal status is reached, and a finding's severity must
//! agree with its category.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::error::{StorageError, StorageResult};
use crate::core::models::{Finding, FindingDetails, FindingsSummary, Scan, ScanId, ScanStatus, ScanType, Severity};

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persists a new PENDING scan with no completion time and no findings.
    async fn create_scan(&self, target: &str, scan_type: ScanType, depth: u8) -> StorageResult<Scan>;

    async fn get_scan(&self, id: ScanId) -> StorageResult<Option<Scan>>;

    /// Every scan, newest first.
    async fn list_scans(&self) -> StorageResult<Vec<Scan>>;

    /// Moves a scan to `status`. Sets the completion time iff `status` is
    /// terminal. Fails with `InvalidTransition` for a non-monotonic move.
    async fn set_scan_status(&self, id: ScanId, status: ScanStatus) -> StorageResult<Option<Scan>>;

    async fn set_scan_findings(&self, id: ScanId, summary: FindingsSummary) -> StorageResult<Option<Scan>>;

    /// Appends one finding to an existing scan.
    async fn create_finding(
        &self,
        scan_id: ScanId,
        severity: Option<Severity>,
        details: FindingDetails,
    ) -> StorageResult<Finding>;

    /// Findings of a scan, newest first.
    async fn get_findings(&self, scan_id: ScanId) -> StorageResult<Vec<Finding>>;
}

/// Applies a status change to an in-memory scan record.
pub(crate) fn apply_status(scan: &mut Scan, status: ScanStatus, now: DateTime<Utc>) -> StorageResult<()> {
    if !scan.status.can_transition_to(status) {
        return Err(StorageError::InvalidTransition { from: scan.status, to: status });
    }
    scan.status = status;
    scan.completed_at = status.is_terminal().then_some(now);
    Ok(())
}

pub(crate) fn new_scan(target: &str, scan_type: ScanType, depth: u8) -> Scan {
    Scan {
        id: ScanId::new(),
        target: target.to_string(),
        scan_type,
        depth,
        status: ScanStatus::Pending,
        started_at: Utc::now(),
        completed_at: None,
        findings: None,
    }
}
