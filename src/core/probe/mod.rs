// src/core/probe/mod.rs

//! Single-target, single-attempt network checks.
//!
//! Each probe kind is a trait so strategies can be driven by live network
//! implementations or by fakes. Probes never retry and never turn an
//! unreachable target into a hard error: resolution failures are negative
//! results, port failures are `closed`/`filtered`, and HTTP transport
//! failures are returned as `ProbeError` for the caller to drop.

pub mod http;
pub mod port;
pub mod resolver;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use url::Url;

use crate::config::EngineConfig;
use crate::core::error::ProbeError;
use crate::core::models::PortState;

pub use self::http::HttpClientProber;
pub use self::port::TcpPortProber;
pub use self::resolver::DnsResolver;

/// DNS record types inspected by the subdomain strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RecordKind {
    #[strum(serialize = "NS")]
    Ns,
    #[strum(serialize = "MX")]
    Mx,
    #[strum(serialize = "TXT")]
    Txt,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Whether `name` resolves to at least one address.
    async fn resolves(&self, name: &str) -> bool;

    /// Raw textual record data of one type for `domain`.
    async fn lookup_records(&self, domain: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProbeOptions {
    pub timeout: Duration,
    pub read_banner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOutcome {
    pub state: PortState,
    pub service: Option<String>,
    pub banner: Option<String>,
}

#[async_trait]
pub trait PortProber: Send + Sync {
    /// Classifies one (host, port) pair. Never fails.
    async fn probe(&self, host: &str, port: u16, options: PortProbeOptions) -> PortOutcome;
}

/// Response to a path probe. Any HTTP status counts as a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResponse {
    pub status_code: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// A fetched page, as seen by the signature-based strategies.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: Url,
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl PageSnapshot {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every `set-cookie` header value.
    pub fn cookies(&self) -> Vec<&str> {
        self.headers
            .get_all("set-cookie")
            .into_iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }
}

#[async_trait]
pub trait HttpProber: Send + Sync {
    /// Requests `path` below `base` without following redirects.
    async fn probe_path(&self, base: &Url, path: &str) -> Result<PathResponse, ProbeError>;

    /// Fetches a whole page, following redirects.
    async fn fetch_page(&self, url: &Url) -> Result<PageSnapshot, ProbeError>;
}

/// The probe implementations a scan runs with.
#[derive(Clone)]
pub struct ProbeSet {
    pub resolver: Arc<dyn Resolver>,
    pub ports: Arc<dyn PortProber>,
    pub http: Arc<dyn HttpProber>,
}

impl ProbeSet {
    pub fn new(resolver: Arc<dyn Resolver>, ports: Arc<dyn PortProber>, http: Arc<dyn HttpProber>) -> Self {
        Self { resolver, ports, http }
    }

    /// Probes backed by the system resolver, TCP sockets and reqwest.
    pub fn live(config: &EngineConfig) -> Result<Self, ProbeError> {
        Ok(Self {
            resolver: Arc::new(DnsResolver::new(config.subdomain.resolver_timeout())),
            ports: Arc::new(TcpPortProber),
            http: Arc::new(HttpClientProber::new(&config.http)?),
        })
    }
}
