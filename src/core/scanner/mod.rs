// src/core/scanner/mod.rs

// This file acts as the public interface for the `scanner` module.
// Each enumeration strategy lives in its own sub-module; they all share a
// `ScanContext` carrying the probes, the configuration and the signatures.
pub mod content_scanner;
pub mod fingerprint_scanner;
pub mod parameter_scanner;
pub mod port_scanner;
pub mod subdomain_scanner;
pub mod vulnerability_scanner;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::EngineConfig;
use crate::core::batcher::TechniqueBatcher;
use crate::core::error::{Result, ScanError};
use crate::core::models::{FindingDetails, Severity};
use crate::core::probe::{PageSnapshot, ProbeSet};
use crate::core::signatures::CompiledCatalog;

/// A finding as produced by a strategy, before it is persisted.
pub type Produced = (Option<Severity>, FindingDetails);

/// Everything a strategy needs to run.
#[derive(Clone)]
pub struct ScanContext {
    pub probes: ProbeSet,
    pub config: Arc<EngineConfig>,
    pub catalog: Arc<CompiledCatalog>,
    pub cancel: CancellationToken,
    findings: Option<UnboundedSender<Produced>>,
}

impl ScanContext {
    pub fn new(probes: ProbeSet, config: Arc<EngineConfig>, catalog: Arc<CompiledCatalog>) -> Self {
        Self { probes, config, catalog, cancel: CancellationToken::new(), findings: None }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Streams every finding to `sink` as soon as a strategy produces it.
    pub fn with_findings(mut self, sink: UnboundedSender<Produced>) -> Self {
        self.findings = Some(sink);
        self
    }

    /// Reports one finding. A no-op for ad-hoc calls, which only use the
    /// strategy's return value.
    pub fn emit(&self, severity: Option<Severity>, details: FindingDetails) {
        if let Some(sink) = &self.findings {
            if sink.send((severity, details)).is_err() {
                debug!("Finding receiver dropped, discarding finding.");
            }
        }
    }

    /// A batcher whose concurrency is bounded by the configured ceiling and
    /// which observes this context's cancellation token.
    pub fn batcher(&self, requested_concurrency: usize, probe_timeout: Duration) -> TechniqueBatcher {
        TechniqueBatcher::new(self.config.batch.bound(requested_concurrency), probe_timeout)
            .with_cancellation(self.cancel.clone())
    }

    /// Fetches the page the signature-based strategies work on. A page that
    /// cannot be fetched at all makes the target unreachable.
    pub(crate) async fn fetch_target_page(&self, url: &Url) -> Result<PageSnapshot> {
        match self.probes.http.fetch_page(url).await {
            Ok(page) => {
                debug!(url = %page.url, status = %page.status_code, "Target page fetched.");
                Ok(page)
            }
            Err(e) => Err(ScanError::TargetUnreachable(format!("{}: {}", url, e))),
        }
    }
}
