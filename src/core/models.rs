// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};
use url::Url;
use uuid::Uuid;

use crate::core::error::{StorageError, ValidationError};

// --- Identifiers ---

/// Opaque identity of a scan. Minted only by the storage gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ScanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingId(Uuid);

impl FindingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FindingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// --- Enumerations ---

/// The kind of scan a client asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ScanType {
    Full,
    Subdomain,
    Parameter,
    Vulnerability,
    Content,
    PortScan,
    TechDetection,
}

impl ScanType {
    /// The strategies this scan type runs, in execution order.
    pub fn strategies(self) -> &'static [Strategy] {
        match self {
            ScanType::Full => &[
                Strategy::Subdomain,
                Strategy::Parameter,
                Strategy::Vulnerability,
                Strategy::Port,
                Strategy::Content,
                Strategy::Technology,
            ],
            ScanType::Subdomain => &[Strategy::Subdomain],
            ScanType::Parameter => &[Strategy::Parameter],
            ScanType::Vulnerability => &[Strategy::Vulnerability],
            ScanType::Content => &[Strategy::Content],
            ScanType::PortScan => &[Strategy::Port],
            ScanType::TechDetection => &[Strategy::Technology],
        }
    }
}

/// One enumeration strategy the orchestrator can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    Subdomain,
    Parameter,
    Vulnerability,
    Port,
    Content,
    Technology,
}

/// Lifecycle state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled)
    }

    /// Transitions are monotonic: nothing leaves a terminal state.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        match self {
            ScanStatus::Pending => matches!(
                next,
                ScanStatus::InProgress | ScanStatus::Failed | ScanStatus::Cancelled
            ),
            ScanStatus::InProgress => next.is_terminal(),
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled => false,
        }
    }
}

/// Category of a finding. Determines the shape of its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCategory {
    Subdomain,
    Parameter,
    Vulnerability,
    Port,
    Directory,
    Technology,
}

impl ResultCategory {
    /// Only vulnerabilities carry a severity.
    pub fn has_severity(self) -> bool {
        matches!(self, ResultCategory::Vulnerability)
    }
}

/// Severity of a vulnerability finding, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Reachability of a probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

// --- Per-category details ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainDetails {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDetails {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDetails {
    pub port: u16,
    pub state: PortState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDetails {
    pub path: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyDetails {
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: u8,
}

/// A vulnerability as produced by the vulnerability strategy, before it is
/// split into finding severity and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityMatch {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: Severity,
}

/// Category-specific payload of a finding. The variant *is* the category,
/// so a details shape can never disagree with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "details", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingDetails {
    Subdomain(SubdomainDetails),
    Parameter(ParameterDetails),
    Vulnerability(VulnerabilityDetails),
    Port(PortDetails),
    Directory(DirectoryDetails),
    Technology(TechnologyDetails),
}

impl FindingDetails {
    pub fn category(&self) -> ResultCategory {
        match self {
            FindingDetails::Subdomain(_) => ResultCategory::Subdomain,
            FindingDetails::Parameter(_) => ResultCategory::Parameter,
            FindingDetails::Vulnerability(_) => ResultCategory::Vulnerability,
            FindingDetails::Port(_) => ResultCategory::Port,
            FindingDetails::Directory(_) => ResultCategory::Directory,
            FindingDetails::Technology(_) => ResultCategory::Technology,
        }
    }

    /// The bare payload, without the category tag.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            FindingDetails::Subdomain(d) => serde_json::to_value(d),
            FindingDetails::Parameter(d) => serde_json::to_value(d),
            FindingDetails::Vulnerability(d) => serde_json::to_value(d),
            FindingDetails::Port(d) => serde_json::to_value(d),
            FindingDetails::Directory(d) => serde_json::to_value(d),
            FindingDetails::Technology(d) => serde_json::to_value(d),
        }
    }

    /// Rebuilds details from a stored category and payload; the payload must
    /// have exactly the shape of the category.
    pub fn from_parts(category: ResultCategory, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match category {
            ResultCategory::Subdomain => FindingDetails::Subdomain(serde_json::from_value(payload)?),
            ResultCategory::Parameter => FindingDetails::Parameter(serde_json::from_value(payload)?),
            ResultCategory::Vulnerability => FindingDetails::Vulnerability(serde_json::from_value(payload)?),
            ResultCategory::Port => FindingDetails::Port(serde_json::from_value(payload)?),
            ResultCategory::Directory => FindingDetails::Directory(serde_json::from_value(payload)?),
            ResultCategory::Technology => FindingDetails::Technology(serde_json::from_value(payload)?),
        })
    }
}

/// Checks that a severity is present exactly when the category has one.
pub fn check_severity(category: ResultCategory, severity: Option<Severity>) -> Result<(), StorageError> {
    if category.has_severity() == severity.is_some() {
        Ok(())
    } else {
        Err(StorageError::SeverityMismatch { category, severity })
    }
}

// --- Entities ---

/// One reconnaissance run against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: ScanId,
    pub target: String,
    pub scan_type: ScanType,
    pub depth: u8,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub findings: Option<FindingsSummary>,
}

/// One discrete piece of evidence produced during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: FindingId,
    pub scan_id: ScanId,
    pub severity: Option<Severity>,
    #[serde(flatten)]
    pub details: FindingDetails,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    pub fn category(&self) -> ResultCategory {
        self.details.category()
    }
}

/// Per-category arrays of everything a scan has found so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindingsSummary {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subdomains: Vec<SubdomainDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<VulnerabilityMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirectoryDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<TechnologyDetails>,
}

impl FindingsSummary {
    pub fn record(&mut self, severity: Option<Severity>, details: &FindingDetails) {
        match details {
            FindingDetails::Subdomain(d) => self.subdomains.push(d.clone()),
            FindingDetails::Parameter(d) => self.parameters.push(d.clone()),
            FindingDetails::Vulnerability(d) => self.vulnerabilities.push(VulnerabilityMatch {
                kind: d.kind.clone(),
                description: d.description.clone(),
                severity: severity.unwrap_or(Severity::Info),
            }),
            FindingDetails::Port(d) => self.ports.push(d.clone()),
            FindingDetails::Directory(d) => self.directories.push(d.clone()),
            FindingDetails::Technology(d) => self.technologies.push(d.clone()),
        }
    }

    pub fn count(&self, category: ResultCategory) -> usize {
        match category {
            ResultCategory::Subdomain => self.subdomains.len(),
            ResultCategory::Parameter => self.parameters.len(),
            ResultCategory::Vulnerability => self.vulnerabilities.len(),
            ResultCategory::Port => self.ports.len(),
            ResultCategory::Directory => self.directories.len(),
            ResultCategory::Technology => self.technologies.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.subdomains.len()
            + self.parameters.len()
            + self.vulnerabilities.len()
            + self.ports.len()
            + self.directories.len()
            + self.technologies.len()
    }
}

// --- Requests and targets ---

pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 5;

/// A client's request to start a persisted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub target: String,
    pub scan_type: ScanType,
    pub depth: u8,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, scan_type: ScanType, depth: u8) -> Self {
        Self { target: target.into(), scan_type, depth }
    }

    /// Rejects malformed requests before anything is persisted.
    pub fn validate(&self) -> Result<Target, ValidationError> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(ValidationError::InvalidDepth(self.depth));
        }
        Target::parse(&self.target)
    }
}

/// A normalised scan target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Bare host name or IP literal.
    pub host: String,
    /// Base URL for HTTP-based strategies.
    pub base_url: Url,
}

impl Target {
    /// Accepts a domain, `host[:port][/path]`, an IP literal or an http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidTarget(raw.to_string()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else if trimmed.parse::<Ipv6Addr>().is_ok() {
            // A bare IPv6 literal needs brackets to be a URL host.
            format!("https://[{}]", trimmed)
        } else {
            format!("https://{}", trimmed)
        };

        let base_url = Url::parse(&with_scheme).map_err(|_| ValidationError::InvalidUrl(raw.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl(raw.to_string()));
        }

        let host = base_url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ValidationError::InvalidTarget(raw.to_string()))?;

        if host.parse::<IpAddr>().is_err() && !is_valid_domain(&host) {
            return Err(ValidationError::InvalidTarget(raw.to_string()));
        }

        Ok(Self { host, base_url })
    }

    pub fn is_ip(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// Domain used for subdomain enumeration: the host without a leading `www.`.
    pub fn root_domain(&self) -> &str {
        self.host.strip_prefix("www.").unwrap_or(&self.host)
    }
}

/// Letters, digits, hyphens and underscores in dot-separated labels of at most 63 characters.
pub fn is_valid_domain(name: &str) -> bool {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}
