// tests/common/mod.rs

//! Scripted probes for driving the engine without a network.
#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use recon_engine::config::EngineConfig;
use recon_engine::core::error::ProbeError;
use recon_engine::core::knowledge_base;
use recon_engine::core::models::PortState;
use recon_engine::core::probe::{
    HttpProber, PageSnapshot, PathResponse, PortOutcome, PortProbeOptions, PortProber, ProbeSet, RecordKind, Resolver,
};
use recon_engine::core::signatures::CompiledCatalog;
use recon_engine::{ScanOrchestrator, ScanStore};

#[derive(Default)]
pub struct FakeResolver {
    pub resolvable: HashSet<String>,
    pub records: HashMap<(String, RecordKind), Vec<String>>,
    /// Names whose resolution never answers.
    pub hanging: HashSet<String>,
    pub hang_all: bool,
    /// Names matching this never answer either.
    pub hang_if: Option<fn(&str) -> bool>,
    /// Resolution panics, taking its worker task down.
    pub panics: bool,
    pub records_fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn resolving(names: &[&str]) -> Self {
        Self { resolvable: names.iter().map(|n| n.to_string()).collect(), ..Default::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolves(&self, name: &str) -> bool {
        self.calls.lock().unwrap().push(name.to_string());
        if self.panics {
            panic!("resolver blew up on {name}");
        }
        if self.hang_all || self.hanging.contains(name) || self.hang_if.is_some_and(|hangs| hangs(name)) {
            pending::<()>().await;
        }
        self.resolvable.contains(name)
    }

    async fn lookup_records(&self, domain: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        if self.records_fail {
            return Err(ProbeError::Dns(format!("no answer for {} {}", kind, domain)));
        }
        Ok(self.records.get(&(domain.to_string(), kind)).cloned().unwrap_or_default())
    }
}

/// Ports listed in `open` answer with their banner; every other port is closed.
#[derive(Default)]
pub struct FakePorts {
    pub open: HashMap<u16, Option<String>>,
    pub probed: AtomicUsize,
}

impl FakePorts {
    pub fn with_open(ports: &[u16]) -> Self {
        Self { open: ports.iter().map(|p| (*p, None)).collect(), ..Default::default() }
    }
}

#[async_trait]
impl PortProber for FakePorts {
    async fn probe(&self, _host: &str, port: u16, options: PortProbeOptions) -> PortOutcome {
        self.probed.fetch_add(1, Ordering::SeqCst);
        let service = knowledge_base::service_for_port(port).map(str::to_string);
        match self.open.get(&port) {
            Some(banner) => PortOutcome {
                state: PortState::Open,
                service,
                banner: banner.clone().filter(|_| options.read_banner),
            },
            None => PortOutcome { state: PortState::Closed, service, banner: None },
        }
    }
}

/// Serves one page for every fetch and a fixed status per known path (404 otherwise).
#[derive(Default)]
pub struct FakeHttp {
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub paths: HashMap<String, u16>,
    /// Page fetches after this many succeed fail with a connect error.
    pub fail_after: Option<usize>,
    pub fetches: AtomicUsize,
}

impl FakeHttp {
    pub fn page(body: &str, headers: &[(&str, &str)]) -> Self {
        Self {
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    pub fn with_paths(mut self, paths: &[(&str, u16)]) -> Self {
        self.paths = paths.iter().map(|(p, s)| (p.to_string(), *s)).collect();
        self
    }

    pub fn failing_after(mut self, fetches: usize) -> Self {
        self.fail_after = Some(fetches);
        self
    }
}

#[async_trait]
impl HttpProber for FakeHttp {
    async fn probe_path(&self, _base: &Url, path: &str) -> Result<PathResponse, ProbeError> {
        let status_code = self.paths.get(path).copied().unwrap_or(404);
        Ok(PathResponse { status_code, content_type: Some("text/html".into()), content_length: Some(0) })
    }

    async fn fetch_page(&self, url: &Url) -> Result<PageSnapshot, ProbeError> {
        let done = self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| done >= limit) {
            return Err(ProbeError::Connect(format!("{} refused the connection", url)));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        Ok(PageSnapshot { url: url.clone(), status_code: 200, headers, body: self.body.clone() })
    }
}

pub fn probes(resolver: FakeResolver, ports: FakePorts, http: FakeHttp) -> ProbeSet {
    ProbeSet::new(Arc::new(resolver), Arc::new(ports), Arc::new(http))
}

/// Small timeouts so hanging fakes cost milliseconds.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.batch.probe_timeout_ms = 200;
    config.subdomain.resolver_timeout_ms = 100;
    config.ports.max_ports = 2048;
    config
}

pub fn orchestrator(store: Arc<dyn ScanStore>, probes: ProbeSet, config: EngineConfig) -> ScanOrchestrator {
    let catalog = CompiledCatalog::builtin().unwrap();
    ScanOrchestrator::with_catalog(store, probes, config, catalog)
}

pub const LOGIN_PAGE: &str = r#"<html>
  <head><title>Sign in</title></head>
  <body>
    <form action="/login?next=home" method="post">
      <input type="text" name="username">
      <input type="password" name="password">
    </form>
    <a href="/search?q=term&page=2">search</a>
  </body>
</html>"#;
