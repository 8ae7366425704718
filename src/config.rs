//! Engine configuration.
//!
//! Loaded from `config.toml` in the per-user config directory, falling back
//! to defaults, with `RECON_ENGINE_*` environment overrides on top.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{Result, ScanError};

/// Hard ceiling for any batch, whatever the configuration says.
pub const MAX_BATCH_CONCURRENCY: usize = 256;

const ENV_PREFIX: &str = "RECON_ENGINE_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: WorkerConfig,
    pub batch: BatchConfig,
    pub subdomain: SubdomainConfig,
    pub ports: PortsConfig,
    pub content: ContentConfig,
    pub http: HttpConfig,
    pub signatures: SignaturesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Scans allowed to run at the same time; the rest wait as PENDING.
    pub max_concurrent_scans: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_concurrent_scans: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub probe_timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 100, probe_timeout_ms: 5000 }
    }
}

impl BatchConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Bounds a requested concurrency to what the configuration allows.
    pub fn bound(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_concurrency.clamp(1, MAX_BATCH_CONCURRENCY))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdomainConfig {
    pub batch_size: usize,
    pub resolver_timeout_ms: u64,
    pub max_permutations: usize,
}

impl Default for SubdomainConfig {
    fn default() -> Self {
        Self { batch_size: 10, resolver_timeout_ms: 3000, max_permutations: 2000 }
    }
}

impl SubdomainConfig {
    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Safety ceiling on the number of ports one scan may probe.
    pub max_ports: usize,
    pub default_speed: u8,
    /// Fill in a typical banner when version detection finds a service but
    /// no live banner could be read.
    pub representative_banners: bool,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self { max_ports: 1024, default_speed: 4, representative_banners: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub concurrency: usize,
    pub accepted_statuses: Vec<u16>,
    pub recursion_probability: f64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            accepted_statuses: vec![200, 204, 301, 302, 307, 401, 403],
            recursion_probability: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: "recon-engine/0.1".to_string(), timeout_ms: 8000 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignaturesConfig {
    /// Signature catalog file; the built-in catalog is used when unset.
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    /// Loads the user config file if it exists, otherwise defaults.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// Loads the config file and applies environment overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `RECON_ENGINE_*` overrides read through `lookup`.
    /// Values that do not parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("MAX_CONCURRENT_SCANS").and_then(|v| v.parse().ok()) {
            self.engine.max_concurrent_scans = v;
            tracing::debug!("Override engine.max_concurrent_scans from env: {}", v);
        }
        if let Some(v) = var("MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.batch.max_concurrency = v;
            tracing::debug!("Override batch.max_concurrency from env: {}", v);
        }
        if let Some(v) = var("PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.batch.probe_timeout_ms = v;
            tracing::debug!("Override batch.probe_timeout_ms from env: {}", v);
        }
        if let Some(v) = var("MAX_PORTS").and_then(|v| v.parse().ok()) {
            self.ports.max_ports = v;
            tracing::debug!("Override ports.max_ports from env: {}", v);
        }
        if let Some(v) = var("USER_AGENT") {
            tracing::debug!("Override http.user_agent from env: {}", v);
            self.http.user_agent = v;
        }
        if let Some(v) = var("SIGNATURES") {
            tracing::debug!("Override signatures.path from env: {}", v);
            self.signatures.path = Some(PathBuf::from(v));
        }
    }

    /// `config.toml` in the per-user config directory.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "recon-engine", "recon-engine").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.subdomain.batch_size, 10);
        assert_eq!(config.ports.max_ports, 1024);
        assert!(!config.ports.representative_banners);
        assert!(config.content.accepted_statuses.contains(&403));
        assert!(config.signatures.path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("[ports]\nmax_ports = 64\n").unwrap();
        assert_eq!(config.ports.max_ports, 64);
        assert_eq!(config.ports.default_speed, 4);
        assert_eq!(config.batch, BatchConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nmax_concurrent_scans = 2\n[http]\nuser_agent = \"tester\"").unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.engine.max_concurrent_scans, 2);
        assert_eq!(config.http.user_agent, "tester");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(EngineConfig::from_toml_str("[ports\n"), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RECON_ENGINE_MAX_PORTS", "100"),
            ("RECON_ENGINE_PROBE_TIMEOUT_MS", "not-a-number"),
            ("RECON_ENGINE_SIGNATURES", "/tmp/sigs.toml"),
        ]);
        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.ports.max_ports, 100);
        assert_eq!(config.batch.probe_timeout_ms, 5000);
        assert_eq!(config.signatures.path, Some(PathBuf::from("/tmp/sigs.toml")));
    }

    #[test]
    fn test_concurrency_bound() {
        let batch = BatchConfig { max_concurrency: 50, probe_timeout_ms: 10 };
        assert_eq!(batch.bound(0), 1);
        assert_eq!(batch.bound(500), 50);
        let huge = BatchConfig { max_concurrency: 10_000, probe_timeout_ms: 10 };
        assert_eq!(huge.bound(10_000), MAX_BATCH_CONCURRENCY);
    }
}
