// src/core/scanner/port_scanner.rs

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ScanContext;
use crate::core::error::{Result, ValidationError};
use crate::core::knowledge_base;
use crate::core::models::{FindingDetails, PortDetails, PortState, Target};
use crate::core::probe::{PortOutcome, PortProbeOptions};

/// Which ports a port scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// The well-known ports of the port→service table.
    Common,
    /// Comma-separated ports and `a-b` ranges, e.g. `22,80,8000-8100`.
    List(String),
    Ports(Vec<u16>),
}

impl PortSpec {
    /// `common` (any case) selects the common list; anything else is a list.
    pub fn parse(spec: &str) -> Self {
        if spec.trim().eq_ignore_ascii_case("common") {
            PortSpec::Common
        } else {
            PortSpec::List(spec.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortScanOptions {
    pub ports: PortSpec,
    /// 1 (slowest, most patient) to 5 (fastest).
    pub speed: u8,
    pub version_detection: bool,
}

impl PortScanOptions {
    /// Common ports at shallow depths, the first 1024 ports beyond.
    pub fn for_depth(depth: u8, speed: u8) -> Self {
        Self {
            ports: if depth <= 3 { PortSpec::Common } else { PortSpec::List("1-1024".to_string()) },
            speed,
            version_detection: depth >= 3,
        }
    }
}

/// Per-probe timeout and batch concurrency for a speed setting.
pub fn speed_profile(speed: u8) -> Result<(Duration, usize), ValidationError> {
    let timeout_ms = match speed {
        1 => 3000,
        2 => 2000,
        3 => 1000,
        4 => 500,
        5 => 250,
        other => return Err(ValidationError::InvalidSpeed(other)),
    };
    Ok((Duration::from_millis(timeout_ms), usize::from(speed) * 20))
}

/// Expands a port specification into a sorted, de-duplicated port list of at
/// most `ceiling` ports. Ranges wider than the ceiling are clamped.
pub fn expand_port_spec(spec: &PortSpec, ceiling: usize) -> Result<Vec<u16>, ValidationError> {
    let ceiling = ceiling.max(1);
    let invalid = |raw: &str, reason: String| ValidationError::InvalidPortSpec { spec: raw.to_string(), reason };

    let ports: BTreeSet<u16> = match spec {
        PortSpec::Common => knowledge_base::common_ports().into_iter().collect(),
        PortSpec::Ports(list) => {
            if list.contains(&0) {
                return Err(invalid("0", "port 0 is not scannable".to_string()));
            }
            list.iter().copied().collect()
        }
        PortSpec::List(raw) => {
            let mut ports = BTreeSet::new();
            for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                match token.split_once('-') {
                    Some((start, end)) => {
                        let start = parse_port(start).map_err(|reason| invalid(raw, reason))?;
                        let end = parse_port(end).map_err(|reason| invalid(raw, reason))?;
                        if start > end {
                            return Err(invalid(raw, format!("range {} is reversed", token)));
                        }
                        let width = usize::from(end - start) + 1;
                        let end = if width > ceiling {
                            warn!(range = %token, ceiling = %ceiling, "Port range wider than the ceiling, clamping.");
                            // ceiling < width <= 65535, so this fits.
                            start.saturating_add(u16::try_from(ceiling - 1).unwrap_or(u16::MAX))
                        } else {
                            end
                        };
                        ports.extend(start..=end);
                    }
                    None => {
                        ports.insert(parse_port(token).map_err(|reason| invalid(raw, reason))?);
                    }
                }
            }
            ports
        }
    };

    if ports.is_empty() {
        return Err(ValidationError::InvalidPortSpec {
            spec: format!("{:?}", spec),
            reason: "no ports".to_string(),
        });
    }
    if ports.len() > ceiling {
        warn!(requested = %ports.len(), ceiling = %ceiling, "Port list exceeds the ceiling, truncating.");
    }
    Ok(ports.into_iter().take(ceiling).collect())
}

/// Builds the reported entry for one answered probe. With `fallback_banners`
/// an open port without a live banner gets its service's typical one.
fn port_details(port: u16, outcome: PortOutcome, fallback_banners: bool) -> PortDetails {
    let banner = outcome.banner.or_else(|| {
        outcome
            .service
            .as_deref()
            .filter(|_| fallback_banners && outcome.state == PortState::Open)
            .and_then(knowledge_base::representative_banner)
            .map(str::to_string)
    });
    PortDetails { port, state: outcome.state, service: outcome.service, banner }
}

fn parse_port(token: &str) -> std::result::Result<u16, String> {
    let value: u32 = token.trim().parse().map_err(|_| format!("{:?} is not a port", token.trim()))?;
    match u16::try_from(value) {
        Ok(0) => Err("port 0 is not scannable".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("{} is above 65535", value)),
    }
}

/// Runs a TCP port scan against `host`.
///
/// # Returns
///
/// Exactly one entry per requested port, sorted by port. Ports whose probe
/// never answered within the batch timeout are reported as filtered.
pub async fn run_port_scan(ctx: &ScanContext, host: &str, options: &PortScanOptions) -> Result<Vec<PortDetails>> {
    let host = Target::parse(host)?.host;
    let ports = expand_port_spec(&options.ports, ctx.config.ports.max_ports)?;
    let (probe_timeout, concurrency) = speed_profile(options.speed)?;

    info!(target = %host, ports = %ports.len(), speed = %options.speed, "Starting port scan.");

    let probe_options = PortProbeOptions { timeout: probe_timeout, read_banner: options.version_detection };
    let prober = ctx.probes.ports.clone();
    let probe_host = host.clone();
    let fallback_banners = options.version_detection && ctx.config.ports.representative_banners;
    // Connect, optional write and read each get the full probe timeout.
    let batch_timeout = probe_timeout * 3;

    let outcomes = ctx
        .batcher(concurrency, batch_timeout)
        .run_with(
            ports.clone(),
            move |port: u16| {
                let prober = prober.clone();
                let host = probe_host.clone();
                async move {
                    let outcome = prober.probe(&host, port, probe_options).await;
                    Some(port_details(port, outcome, fallback_banners))
                }
            },
            |details: &PortDetails| ctx.emit(None, FindingDetails::Port(details.clone())),
        )
        .await;

    let mut by_port: HashMap<u16, PortDetails> = outcomes.into_iter().map(|d| (d.port, d)).collect();

    let results: Vec<PortDetails> = ports
        .into_iter()
        .map(|port| {
            by_port.remove(&port).unwrap_or_else(|| PortDetails {
                port,
                state: PortState::Filtered,
                service: knowledge_base::service_for_port(port).map(str::to_string),
                banner: None,
            })
        })
        .collect();

    let open = results.iter().filter(|p| p.state == PortState::Open).count();
    debug!(target = %host, total = %results.len(), "Port probes collected.");
    info!(target = %host, open = %open, "Port scan finished.");
    Ok(results)
}
