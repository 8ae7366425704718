// src/core/storage/memory.rs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{apply_status, new_scan, ScanStore};
use crate::core::error::{StorageError, StorageResult};
use crate::core::models::{
    check_severity, Finding, FindingDetails, FindingId, FindingsSummary, Scan, ScanId, ScanStatus, ScanType, Severity,
};

/// Arena-style store keyed by `ScanId`. Sequence numbers break timestamp ties.
#[derive(Debug, Default)]
pub struct MemoryStore {
    arena: RwLock<Arena>,
}

#[derive(Debug, Default)]
struct Arena {
    next_seq: u64,
    scans: HashMap<ScanId, (u64, Scan)>,
    findings: HashMap<ScanId, Vec<(u64, Finding)>>,
}

impl Arena {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn create_scan(&self, target: &str, scan_type: ScanType, depth: u8) -> StorageResult<Scan> {
        let scan = new_scan(target, scan_type, depth);
        let mut arena = self.arena.write().await;
        let seq = arena.next_seq();
        arena.scans.insert(scan.id, (seq, scan.clone()));
        Ok(scan)
    }

    async fn get_scan(&self, id: ScanId) -> StorageResult<Option<Scan>> {
        Ok(self.arena.read().await.scans.get(&id).map(|(_, scan)| scan.clone()))
    }

    async fn list_scans(&self) -> StorageResult<Vec<Scan>> {
        let arena = self.arena.read().await;
        let mut scans: Vec<&(u64, Scan)> = arena.scans.values().collect();
        scans.sort_by(|(sa, a), (sb, b)| b.started_at.cmp(&a.started_at).then(sb.cmp(sa)));
        Ok(scans.into_iter().map(|(_, scan)| scan.clone()).collect())
    }

    async fn set_scan_status(&self, id: ScanId, status: ScanStatus) -> StorageResult<Option<Scan>> {
        let mut arena = self.arena.write().await;
        let Some((_, scan)) = arena.scans.get_mut(&id) else {
            return Ok(None);
        };
        apply_status(scan, status, Utc::now())?;
        Ok(Some(scan.clone()))
    }

    async fn set_scan_findings(&self, id: ScanId, summary: FindingsSummary) -> StorageResult<Option<Scan>> {
        let mut arena = self.arena.write().await;
        Ok(arena.scans.get_mut(&id).map(|(_, scan)| {
            scan.findings = Some(summary);
            scan.clone()
        }))
    }

    async fn create_finding(
        &self,
        scan_id: ScanId,
        severity: Option<Severity>,
        details: FindingDetails,
    ) -> StorageResult<Finding> {
        check_severity(details.category(), severity)?;
        let mut arena = self.arena.write().await;
        if !arena.scans.contains_key(&scan_id) {
            return Err(StorageError::ScanNotFound(scan_id));
        }

        let finding = Finding { id: FindingId::new(), scan_id, severity, details, created_at: Utc::now() };
        let seq = arena.next_seq();
        arena.findings.entry(scan_id).or_default().push((seq, finding.clone()));
        Ok(finding)
    }

    async fn get_findings(&self, scan_id: ScanId) -> StorageResult<Vec<Finding>> {
        let arena = self.arena.read().await;
        let mut findings: Vec<&(u64, Finding)> = arena.findings.get(&scan_id).into_iter().flatten().collect();
        findings.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(findings.into_iter().map(|(_, finding)| finding.clone()).collect())
    }
}
