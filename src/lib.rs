// src/lib.rs

//! Reconnaissance scan orchestration engine.
//!
//! A [`ScanOrchestrator`] accepts scan requests against a domain, host or
//! URL, tracks each scan through `PENDING → IN_PROGRESS → COMPLETED | FAILED |
//! CANCELLED`, fans out to the enumeration strategies (subdomains, ports,
//! content, technologies, parameters, vulnerabilities) with bounded
//! concurrency and persists every finding through a [`ScanStore`].

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::EngineConfig;
pub use crate::core::error::{ProbeError, Result, ScanError, StorageError, ValidationError};
pub use crate::core::models::{
    Finding, FindingDetails, FindingsSummary, ResultCategory, Scan, ScanId, ScanRequest, ScanStatus, ScanType,
    Severity,
};
pub use crate::core::orchestrator::ScanOrchestrator;
pub use crate::core::probe::ProbeSet;
pub use crate::core::storage::{MemoryStore, ScanStore, SqliteStore};
