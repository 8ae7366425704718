// src/main.rs

use color_eyre::eyre::{eyre, Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use recon_engine::core::models::ScanRequest;
use recon_engine::logging::{get_data_dir, initialize_logging};
use recon_engine::{EngineConfig, ProbeSet, ScanOrchestrator, ScanType, SqliteStore};

const USAGE: &str = "usage: recon-engine <target> [scan-type] [depth]";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    color_eyre::install()?;
    // Logging reads the local UTC offset, so it starts before the runtime threads.
    initialize_logging()?;

    let request = parse_args(std::env::args().skip(1))?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(request))
}

/// Reads `<target> [scan-type] [depth]`; defaults are FULL at depth 1.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ScanRequest> {
    let target = args.next().ok_or_else(|| eyre!(USAGE))?;
    let scan_type = match args.next() {
        Some(raw) => raw.parse::<ScanType>().map_err(|_| eyre!("unknown scan type '{}'\n{}", raw, USAGE))?,
        None => ScanType::Full,
    };
    let depth = match args.next() {
        Some(raw) => raw.parse::<u8>().map_err(|_| eyre!("depth must be a number, got '{}'\n{}", raw, USAGE))?,
        None => 1,
    };
    Ok(ScanRequest::new(target, scan_type, depth))
}

async fn run(request: ScanRequest) -> Result<()> {
    let config = EngineConfig::load_with_env().wrap_err("loading configuration")?;

    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let store = SqliteStore::open(&data_dir.join("scans.db"))
        .await
        .wrap_err("opening the scan database")?;

    let probes = ProbeSet::live(&config)?;
    let orchestrator = ScanOrchestrator::new(Arc::new(store), probes, config)?;

    let scan = orchestrator.create_scan(request).await?;
    info!(scan_id = %scan.id, "Waiting for scan to finish.");
    eprintln!("scan {} submitted ({} on {})", scan.id, scan.scan_type, scan.target);

    let scan = orchestrator.wait_for_scan(scan.id, POLL_INTERVAL).await?;
    let findings = orchestrator.get_findings(scan.id).await?;

    let report = serde_json::json!({ "scan": scan, "findings": findings });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
