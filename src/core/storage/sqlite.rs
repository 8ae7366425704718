// src/core/storage/sqlite.rs

//! SQLite adapter of the storage gateway.
//!
//! Timestamps are stored as UTC microseconds, finding details as their
//! category plus the bare JSON payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use strum::IntoEnumIterator;

use super::{new_scan, ScanStore};
use crate::core::error::{StorageError, StorageResult};
use crate::core::models::{
    check_severity, Finding, FindingDetails, FindingId, FindingsSummary, ResultCategory, Scan, ScanId, ScanStatus,
    ScanType, Severity,
};

const SCAN_COLUMNS: &str = "id, target, scan_type, depth, status, started_at, completed_at, findings";
const FINDING_COLUMNS: &str = "id, scan_id, category, severity, details, created_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        tracing::info!("Scan database opened at {}", path.display());
        Self::with_pool(pool).await
    }

    /// A private in-memory database. One connection that never expires, so
    /// the data lives as long as the store.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wraps an existing pool and applies the schema.
    pub async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        tracing::debug!("Running scan database migrations");
        sqlx::migrate!("./migrations").run(&pool).await.map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_scan(&self, id: ScanId) -> StorageResult<Option<Scan>> {
        let row = sqlx::query(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scan_from_row).transpose()
    }
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn create_scan(&self, target: &str, scan_type: ScanType, depth: u8) -> StorageResult<Scan> {
        let scan = new_scan(target, scan_type, depth);

        sqlx::query(
            "INSERT INTO scans (id, target, scan_type, depth, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(scan.id.to_string())
        .bind(&scan.target)
        .bind(scan.scan_type.to_string())
        .bind(i64::from(scan.depth))
        .bind(scan.status.to_string())
        .bind(scan.started_at.timestamp_micros())
        .execute(&self.pool)
        .await?;

        Ok(scan)
    }

    async fn get_scan(&self, id: ScanId) -> StorageResult<Option<Scan>> {
        self.fetch_scan(id).await
    }

    async fn list_scans(&self) -> StorageResult<Vec<Scan>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans ORDER BY started_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(scan_from_row).collect()
    }

    async fn set_scan_status(&self, id: ScanId, status: ScanStatus) -> StorageResult<Option<Scan>> {
        // The allowed predecessors go into the WHERE clause so that the check
        // and the write are one atomic statement.
        let sources: Vec<ScanStatus> = ScanStatus::iter().filter(|s| s.can_transition_to(status)).collect();
        let completed_at = status.is_terminal().then(|| Utc::now().timestamp_micros());

        let updated = if sources.is_empty() {
            0
        } else {
            let placeholders = vec!["?"; sources.len()].join(", ");
            let sql = format!("UPDATE scans SET status = ?, completed_at = ? WHERE id = ? AND status IN ({placeholders})");
            let mut query = sqlx::query(&sql)
                .bind(status.to_string())
                .bind(completed_at)
                .bind(id.to_string());
            for source in &sources {
                query = query.bind(source.to_string());
            }
            query.execute(&self.pool).await?.rows_affected()
        };

        let Some(scan) = self.fetch_scan(id).await? else {
            return Ok(None);
        };
        if updated == 0 {
            return Err(StorageError::InvalidTransition { from: scan.status, to: status });
        }
        Ok(Some(scan))
    }

    async fn set_scan_findings(&self, id: ScanId, summary: FindingsSummary) -> StorageResult<Option<Scan>> {
        let json = serde_json::to_string(&summary)?;
        let updated = sqlx::query("UPDATE scans SET findings = ? WHERE id = ?")
            .bind(json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }
        self.fetch_scan(id).await
    }

    async fn create_finding(
        &self,
        scan_id: ScanId,
        severity: Option<Severity>,
        details: FindingDetails,
    ) -> StorageResult<Finding> {
        check_severity(details.category(), severity)?;
        if self.fetch_scan(scan_id).await?.is_none() {
            return Err(StorageError::ScanNotFound(scan_id));
        }

        let finding = Finding { id: FindingId::new(), scan_id, severity, details, created_at: Utc::now() };
        sqlx::query(
            "INSERT INTO findings (id, scan_id, category, severity, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(finding.id.to_string())
        .bind(scan_id.to_string())
        .bind(finding.category().to_string())
        .bind(severity.map(|s| s.to_string()))
        .bind(serde_json::to_string(&finding.details.payload()?)?)
        .bind(finding.created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;

        Ok(finding)
    }

    async fn get_findings(&self, scan_id: ScanId) -> StorageResult<Vec<Finding>> {
        let rows = sqlx::query(&format!(
            "SELECT {FINDING_COLUMNS} FROM findings WHERE scan_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(scan_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(finding_from_row).collect()
    }
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(format!("{what}: {value}"))
}

fn parse_column<T: FromStr>(row: &SqliteRow, column: &str) -> StorageResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|_| corrupt(column, &raw))
}

fn timestamp(micros: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| corrupt("timestamp", micros))
}

fn scan_from_row(row: &SqliteRow) -> StorageResult<Scan> {
    let depth: i64 = row.try_get("depth")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;
    let findings: Option<String> = row.try_get("findings")?;

    Ok(Scan {
        id: parse_column(row, "id")?,
        target: row.try_get("target")?,
        scan_type: parse_column(row, "scan_type")?,
        depth: u8::try_from(depth).map_err(|_| corrupt("depth", depth))?,
        status: parse_column(row, "status")?,
        started_at: timestamp(row.try_get("started_at")?)?,
        completed_at: completed_at.map(timestamp).transpose()?,
        findings: findings.as_deref().map(serde_json::from_str).transpose()?,
    })
}

fn finding_from_row(row: &SqliteRow) -> StorageResult<Finding> {
    let category: ResultCategory = parse_column(row, "category")?;
    let severity: Option<String> = row.try_get("severity")?;
    let severity = severity
        .map(|s| s.parse::<Severity>().map_err(|_| corrupt("severity", &s)))
        .transpose()?;
    let details: String = row.try_get("details")?;

    Ok(Finding {
        id: parse_column(row, "id")?,
        scan_id: parse_column(row, "scan_id")?,
        severity,
        details: FindingDetails::from_parts(category, serde_json::from_str(&details)?)?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}
