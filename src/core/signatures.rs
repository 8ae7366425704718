// src/core/signatures.rs

//! Signature catalog used by the technology, parameter and vulnerability
//! strategies.
//!
//! The catalog is plain configuration data: it can be loaded from a TOML file
//! or taken from the built-in tables in `knowledge_base`. The strategies only
//! ever see the compiled form, so the matching machinery can be tested with
//! any catalog.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::core::error::{Result, ScanError};
use crate::core::knowledge_base;
use crate::core::models::Severity;

/// Where in a fetched page a technology pattern is looked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum MatchLocation {
    Header { name: String },
    MetaTag { name: String },
    Body,
    ScriptSrc,
    LinkHref,
    Cookie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologySignature {
    pub name: String,
    pub category: String,
    pub location: MatchLocation,
    /// The first capture group, if any, is taken as the version.
    pub pattern: String,
    pub confidence: u8,
    /// Only evaluated when a coverage rule asks for this rule's category.
    #[serde(default)]
    pub on_demand: bool,
}

/// If any technology of `when_category` matched, the on-demand rules of
/// `ensure_category` are evaluated too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRule {
    pub when_category: String,
    pub ensure_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum VulnerabilityRule {
    MissingHeader { header: String },
    HeaderMatches { header: String, pattern: String },
    BodyMatches { pattern: String },
    CookieMissingFlag { flag: String },
    InsecureScheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilitySignature {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: Severity,
    pub rule: VulnerabilityRule,
}

/// The uncompiled catalog, as written in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureCatalog {
    pub technologies: Vec<TechnologySignature>,
    pub coverage: Vec<CoverageRule>,
    /// Common parameter names worth reporting when a page references them.
    pub parameters: Vec<String>,
    pub vulnerabilities: Vec<VulnerabilitySignature>,
}

impl SignatureCatalog {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ScanError::Signatures(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading signature catalog.");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Signatures(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledTechnology {
    pub name: String,
    pub category: String,
    pub location: MatchLocation,
    pub regex: Regex,
    pub confidence: u8,
    pub on_demand: bool,
}

#[derive(Debug, Clone)]
pub enum CompiledCheck {
    MissingHeader(String),
    HeaderMatches(String, Regex),
    BodyMatches(Regex),
    CookieMissingFlag(String),
    InsecureScheme,
}

#[derive(Debug, Clone)]
pub struct CompiledVulnerability {
    pub kind: String,
    pub description: String,
    pub severity: Severity,
    pub check: CompiledCheck,
}

/// A catalog with every pattern compiled, ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledCatalog {
    pub technologies: Vec<CompiledTechnology>,
    pub coverage: Vec<CoverageRule>,
    pub parameters: Vec<String>,
    pub vulnerabilities: Vec<CompiledVulnerability>,
}

impl CompiledCatalog {
    pub fn compile(catalog: &SignatureCatalog) -> Result<Self> {
        let technologies = catalog
            .technologies
            .iter()
            .map(|sig| {
                if sig.confidence > 100 {
                    return Err(ScanError::Signatures(format!(
                        "confidence {} of {} exceeds 100",
                        sig.confidence, sig.name
                    )));
                }
                Ok(CompiledTechnology {
                    name: sig.name.clone(),
                    category: sig.category.clone(),
                    location: sig.location.clone(),
                    regex: compile_pattern(&sig.pattern)?,
                    confidence: sig.confidence,
                    on_demand: sig.on_demand,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let vulnerabilities = catalog
            .vulnerabilities
            .iter()
            .map(|sig| {
                let check = match &sig.rule {
                    VulnerabilityRule::MissingHeader { header } => {
                        CompiledCheck::MissingHeader(header.to_ascii_lowercase())
                    }
                    VulnerabilityRule::HeaderMatches { header, pattern } => {
                        CompiledCheck::HeaderMatches(header.to_ascii_lowercase(), compile_pattern(pattern)?)
                    }
                    VulnerabilityRule::BodyMatches { pattern } => CompiledCheck::BodyMatches(compile_pattern(pattern)?),
                    VulnerabilityRule::CookieMissingFlag { flag } => {
                        CompiledCheck::CookieMissingFlag(flag.to_ascii_lowercase())
                    }
                    VulnerabilityRule::InsecureScheme => CompiledCheck::InsecureScheme,
                };
                Ok(CompiledVulnerability {
                    kind: sig.kind.clone(),
                    description: sig.description.clone(),
                    severity: sig.severity,
                    check,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            technologies = %technologies.len(),
            vulnerabilities = %vulnerabilities.len(),
            parameters = %catalog.parameters.len(),
            "Signature catalog compiled."
        );

        Ok(Self {
            technologies,
            coverage: catalog.coverage.clone(),
            parameters: catalog.parameters.clone(),
            vulnerabilities,
        })
    }

    /// The catalog shipped with the engine.
    pub fn builtin() -> Result<Self> {
        Self::compile(&knowledge_base::builtin_catalog())
    }

    /// Loads a catalog file if one is given, otherwise the built-in one.
    pub fn from_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::compile(&SignatureCatalog::load(path)?),
            None => Self::builtin(),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ScanError::Signatures(format!("pattern {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_compiles() {
        let catalog = CompiledCatalog::builtin().unwrap();
        assert!(!catalog.technologies.is_empty());
        assert!(!catalog.vulnerabilities.is_empty());
        assert!(!catalog.parameters.is_empty());
        assert!(catalog
            .coverage
            .iter()
            .any(|rule| rule.when_category == "JS Framework" && rule.ensure_category == "JS Library"));
    }

    #[test]
    fn test_catalog_from_toml() {
        let toml = r#"
            parameters = ["token"]

            [[technologies]]
            name = "Caddy"
            category = "Web Server"
            pattern = "Caddy"
            confidence = 95
            location = { check = "header", name = "server" }

            [[vulnerabilities]]
            type = "Missing HSTS"
            description = "No Strict-Transport-Security header."
            severity = "MEDIUM"
            rule = { check = "missing_header", header = "Strict-Transport-Security" }
        "#;
        let catalog = SignatureCatalog::from_toml_str(toml).unwrap();
        let compiled = CompiledCatalog::compile(&catalog).unwrap();
        assert_eq!(compiled.technologies[0].location, MatchLocation::Header { name: "server".into() });
        assert!(matches!(
            &compiled.vulnerabilities[0].check,
            CompiledCheck::MissingHeader(h) if h == "strict-transport-security"
        ));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let catalog = SignatureCatalog {
            technologies: vec![TechnologySignature {
                name: "Broken".into(),
                category: "Test".into(),
                location: MatchLocation::Body,
                pattern: "(unclosed".into(),
                confidence: 50,
                on_demand: false,
            }],
            ..Default::default()
        };
        assert!(matches!(CompiledCatalog::compile(&catalog), Err(ScanError::Signatures(_))));
    }
}
