// src/core/orchestrator.rs

//! The scan orchestrator.
//!
//! Accepts scan requests, persists them as PENDING and runs them on a worker
//! pool. A running scan moves to IN_PROGRESS, runs its strategies in order,
//! persists each finding as soon as a probe produces it and ends COMPLETED,
//! FAILED or CANCELLED. Findings persisted before a failure are kept.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::error::{Result, ScanError, StorageError};
use crate::core::models::{
    DirectoryDetails, Finding, FindingDetails, FindingsSummary, ParameterDetails, PortDetails, PortState, Scan, ScanId,
    ScanRequest, ScanStatus, Strategy, Target, TechnologyDetails, VulnerabilityMatch,
};
use crate::core::probe::ProbeSet;
use crate::core::scanner::content_scanner::{self, ContentOptions};
use crate::core::scanner::port_scanner::{self, PortScanOptions, PortSpec};
use crate::core::scanner::subdomain_scanner::{self, SubdomainOptions, SubdomainTechnique};
use crate::core::scanner::{fingerprint_scanner, parameter_scanner, vulnerability_scanner, Produced, ScanContext};
use crate::core::signatures::CompiledCatalog;
use crate::core::storage::ScanStore;
use crate::core::wordlists::{ContentWordlist, SubdomainWordlist};

#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    probes: ProbeSet,
    config: Arc<EngineConfig>,
    catalog: Arc<CompiledCatalog>,
    workers: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<ScanId, CancellationToken>>>,
}

impl ScanOrchestrator {
    /// Builds an orchestrator with the catalog named by the configuration
    /// (or the built-in one).
    pub fn new(store: Arc<dyn ScanStore>, probes: ProbeSet, config: EngineConfig) -> Result<Self> {
        let catalog = CompiledCatalog::from_path(config.signatures.path.as_deref())?;
        Ok(Self::with_catalog(store, probes, config, catalog))
    }

    pub fn with_catalog(
        store: Arc<dyn ScanStore>,
        probes: ProbeSet,
        config: EngineConfig,
        catalog: CompiledCatalog,
    ) -> Self {
        let permits = config.engine.max_concurrent_scans.max(1);
        info!(workers = %permits, "Scan orchestrator ready.");
        Self {
            store,
            probes,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            workers: Arc::new(Semaphore::new(permits)),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn context(&self, cancel: CancellationToken) -> ScanContext {
        ScanContext::new(self.probes.clone(), self.config.clone(), self.catalog.clone()).with_cancellation(cancel)
    }

    // --- Persisted scans ---

    /// Validates and persists a new scan, schedules it and returns the
    /// PENDING record without waiting for any probing.
    pub async fn create_scan(&self, request: ScanRequest) -> Result<Scan> {
        let target = request.validate()?;
        let scan = self.store.create_scan(&request.target, request.scan_type, request.depth).await?;
        info!(scan_id = %scan.id, target = %scan.target, scan_type = %scan.scan_type, depth = %scan.depth, "Scan created.");

        let cancel = CancellationToken::new();
        self.running.lock().await.insert(scan.id, cancel.clone());
        self.spawn_worker(scan.clone(), target, cancel);
        Ok(scan)
    }

    pub async fn get_scan(&self, id: ScanId) -> Result<Option<Scan>> {
        Ok(self.store.get_scan(id).await?)
    }

    pub async fn list_scans(&self) -> Result<Vec<Scan>> {
        Ok(self.store.list_scans().await?)
    }

    pub async fn get_findings(&self, scan_id: ScanId) -> Result<Vec<Finding>> {
        Ok(self.store.get_findings(scan_id).await?)
    }

    /// Marks a PENDING or IN_PROGRESS scan CANCELLED and asks its worker to
    /// stop at the next checkpoint.
    pub async fn cancel_scan(&self, id: ScanId) -> Result<Option<Scan>> {
        let scan = self.store.set_scan_status(id, ScanStatus::Cancelled).await?;
        if let Some(token) = self.running.lock().await.get(&id) {
            token.cancel();
        }
        if scan.is_some() {
            info!(scan_id = %id, "Scan cancelled.");
        }
        Ok(scan)
    }

    /// Polls until the scan reaches a terminal status.
    pub async fn wait_for_scan(&self, id: ScanId, poll_interval: Duration) -> Result<Scan> {
        loop {
            match self.store.get_scan(id).await? {
                Some(scan) if scan.status.is_terminal() => return Ok(scan),
                Some(_) => tokio::time::sleep(poll_interval).await,
                None => return Err(StorageError::ScanNotFound(id).into()),
            }
        }
    }

    /// Runs one scan on the worker pool. The scan itself runs in an inner
    /// task so that a panic still ends in the FAILED transition.
    fn spawn_worker(&self, scan: Scan, target: Target, cancel: CancellationToken) {
        let this = self.clone();
        tokio::spawn(async move {
            let id = scan.id;
            let outcome = match this.workers.clone().acquire_owned().await {
                Ok(permit) => {
                    let runner = this.clone();
                    let inner = tokio::spawn(async move {
                        let _permit = permit;
                        runner.process_scan(scan, target, cancel).await
                    });
                    match inner.await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(ScanError::WorkerAborted(e.to_string())),
                    }
                }
                Err(e) => Err(ScanError::WorkerAborted(e.to_string())),
            };
            this.finish(id, outcome).await;
            this.running.lock().await.remove(&id);
        });
    }

    async fn process_scan(&self, scan: Scan, target: Target, cancel: CancellationToken) -> Result<FindingsSummary> {
        checkpoint(&cancel)?;
        self.transition(scan.id, ScanStatus::InProgress).await?;
        info!(scan_id = %scan.id, target = %scan.target, "Scan started.");

        let ctx = self.context(cancel.clone());
        let mut summary = FindingsSummary::default();
        let target = &target;
        let depth = scan.depth;

        for &strategy in scan.scan_type.strategies() {
            checkpoint(&cancel)?;
            debug!(scan_id = %scan.id, strategy = %strategy, "Running strategy.");

            // The strategy streams findings while the drain persists them; the
            // channel closes when the strategy's context is dropped.
            let (sink, findings) = mpsc::unbounded_channel();
            let strategy_ctx = ctx.clone().with_findings(sink);
            let run = async move { run_strategy(&strategy_ctx, strategy, target, depth).await };
            let drain = self.persist_findings(scan.id, findings, &cancel, &mut summary);
            let (outcome, persisted) = tokio::join!(run, drain);
            persisted?;
            outcome?;
            checkpoint(&cancel)?;

            info!(
                scan_id = %scan.id,
                strategy = %strategy,
                total = %summary.total(),
                "Strategy finished."
            );
        }

        Ok(summary)
    }

    /// Persists findings as they arrive and keeps the scan's summary current.
    /// Once the scan is cancelled, arriving findings are dropped.
    async fn persist_findings(
        &self,
        id: ScanId,
        mut findings: UnboundedReceiver<Produced>,
        cancel: &CancellationToken,
        summary: &mut FindingsSummary,
    ) -> Result<()> {
        while let Some((severity, details)) = findings.recv().await {
            if cancel.is_cancelled() || !is_persisted(&details) {
                continue;
            }
            self.store.create_finding(id, severity, details.clone()).await?;
            summary.record(severity, &details);
            self.store.set_scan_findings(id, summary.clone()).await?;
        }
        Ok(())
    }

    /// Applies the terminal transition for a finished worker.
    async fn finish(&self, id: ScanId, outcome: Result<FindingsSummary>) {
        match outcome {
            Ok(summary) => {
                let total = summary.total();
                let completed = match self.store.set_scan_findings(id, summary).await {
                    Ok(_) => self.transition(id, ScanStatus::Completed).await,
                    Err(e) => Err(e.into()),
                };
                match completed {
                    Ok(_) => info!(scan_id = %id, findings = %total, "Scan completed."),
                    Err(ScanError::Cancelled) => info!(scan_id = %id, "Scan was cancelled before completing."),
                    Err(e) => {
                        error!(scan_id = %id, error = %e, "Could not complete scan.");
                        self.mark_failed(id).await;
                    }
                }
            }
            Err(ScanError::Cancelled) => info!(scan_id = %id, "Scan stopped after cancellation."),
            Err(e) => {
                error!(scan_id = %id, error = %e, "Scan failed.");
                self.mark_failed(id).await;
            }
        }
    }

    async fn mark_failed(&self, id: ScanId) {
        match self.transition(id, ScanStatus::Failed).await {
            Ok(_) => {}
            Err(ScanError::Cancelled) => debug!(scan_id = %id, "Scan already cancelled, not marking failed."),
            Err(e) => error!(scan_id = %id, error = %e, "Could not mark scan as failed."),
        }
    }

    /// Moves a scan to `status`. A scan found already CANCELLED yields
    /// `ScanError::Cancelled`.
    async fn transition(&self, id: ScanId, status: ScanStatus) -> Result<Scan> {
        match self.store.set_scan_status(id, status).await {
            Ok(Some(scan)) => Ok(scan),
            Ok(None) => Err(StorageError::ScanNotFound(id).into()),
            Err(StorageError::InvalidTransition { from: ScanStatus::Cancelled, .. }) => Err(ScanError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    // --- Ad-hoc tool calls ---

    /// Enumerates subdomains of `domain` outside of any persisted scan.
    ///
    /// # Arguments
    ///
    /// * `technique` - Which discovery phases to run.
    /// * `wordlist` - Brute-force prefixes, ignored when `custom_prefixes` is given.
    /// * `custom_prefixes` - Prefixes for the custom technique or wordlist.
    ///
    /// # Returns
    ///
    /// The resolvable subdomains, sorted and deduplicated.
    pub async fn subdomain_find(
        &self,
        domain: &str,
        technique: SubdomainTechnique,
        wordlist: SubdomainWordlist,
        custom_prefixes: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        let options = SubdomainOptions { technique, wordlist, custom_prefixes };
        subdomain_scanner::run_subdomain_scan(&self.context(CancellationToken::new()), domain, &options).await
    }

    /// Probes `ports` on `target`.
    ///
    /// # Arguments
    ///
    /// * `ports` - A list and/or ranges, e.g. `22,80,8000-8100`.
    /// * `speed` - 1 (slowest) to 5; sets probe concurrency and timeout.
    /// * `version_detection` - Read a banner from each open port.
    ///
    /// # Returns
    ///
    /// One entry per requested port in ascending order, whatever its state.
    pub async fn port_scan(&self, target: &str, ports: &str, speed: u8, version_detection: bool) -> Result<Vec<PortDetails>> {
        let options = PortScanOptions { ports: PortSpec::parse(ports), speed, version_detection };
        port_scanner::run_port_scan(&self.context(CancellationToken::new()), target, &options).await
    }

    /// # Arguments
    ///
    /// * `extensions` - Comma-separated, e.g. `php,html`.
    /// * `concurrency` - Requested probe concurrency; the configured value when `None`.
    /// * `status_filter` - Comma-separated accepted statuses; the configured set when `None`.
    pub async fn content_discover(
        &self,
        url: &str,
        wordlist: ContentWordlist,
        recursive: bool,
        extensions: &str,
        concurrency: Option<usize>,
        status_filter: Option<&str>,
    ) -> Result<Vec<DirectoryDetails>> {
        let options = ContentOptions {
            wordlist,
            recursive,
            extensions: content_scanner::parse_extensions(extensions)?,
            concurrency: concurrency.unwrap_or(self.config.content.concurrency),
            accepted_statuses: status_filter.map(content_scanner::parse_status_filter).transpose()?,
        };
        content_scanner::run_content_discovery(&self.context(CancellationToken::new()), url, &options).await
    }

    /// Fingerprints the technologies behind `url`.
    ///
    /// # Returns
    ///
    /// The detected technologies, with a version where one was captured.
    pub async fn tech_detect(&self, url: &str) -> Result<Vec<TechnologyDetails>> {
        fingerprint_scanner::run_tech_detection(&self.context(CancellationToken::new()), url).await
    }

    /// Collects parameter names from the query strings, forms and links of `url`.
    ///
    /// # Returns
    ///
    /// The distinct parameters, sorted by name.
    pub async fn parameter_discover(&self, url: &str) -> Result<Vec<ParameterDetails>> {
        parameter_scanner::run_parameter_discovery(&self.context(CancellationToken::new()), url).await
    }

    /// Runs the passive checks against one fetch of `url`.
    ///
    /// # Returns
    ///
    /// The matches, most severe first.
    pub async fn vulnerability_scan(&self, url: &str) -> Result<Vec<VulnerabilityMatch>> {
        vulnerability_scanner::run_vulnerability_scan(&self.context(CancellationToken::new()), url).await
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() { Err(ScanError::Cancelled) } else { Ok(()) }
}

/// Persisted scans keep open ports only.
fn is_persisted(details: &FindingDetails) -> bool {
    match details {
        FindingDetails::Port(port) => port.state == PortState::Open,
        _ => true,
    }
}

/// Runs one strategy of a persisted scan with the settings its depth implies.
/// Findings reach the store through the context's sink, not the return value.
async fn run_strategy(ctx: &ScanContext, strategy: Strategy, target: &Target, depth: u8) -> Result<()> {
    let url = target.base_url.as_str();
    match strategy {
        Strategy::Subdomain => {
            if target.is_ip() {
                warn!(target = %target.host, "Target is an IP literal, skipping subdomain enumeration.");
                return Ok(());
            }
            subdomain_scanner::run_subdomain_scan(ctx, target.root_domain(), &SubdomainOptions::for_depth(depth)).await?;
        }
        Strategy::Parameter => {
            parameter_scanner::run_parameter_discovery(ctx, url).await?;
        }
        Strategy::Vulnerability => {
            vulnerability_scanner::run_vulnerability_scan(ctx, url).await?;
        }
        Strategy::Port => {
            let options = PortScanOptions::for_depth(depth, ctx.config.ports.default_speed);
            port_scanner::run_port_scan(ctx, &target.host, &options).await?;
        }
        Strategy::Content => {
            let options = ContentOptions::for_depth(depth, ctx.config.content.concurrency);
            content_scanner::run_content_discovery(ctx, url, &options).await?;
        }
        Strategy::Technology => {
            fingerprint_scanner::run_tech_detection(ctx, url).await?;
        }
    }
    Ok(())
}
