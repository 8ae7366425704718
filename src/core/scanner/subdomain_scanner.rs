// src/core/scanner/subdomain_scanner.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use super::ScanContext;
use crate::core::error::{Result, ScanError, ValidationError};
use crate::core::models::{is_valid_domain, FindingDetails, SubdomainDetails};
use crate::core::probe::RecordKind;
use crate::core::wordlists::{self, SubdomainWordlist};

/// Separators used to combine a discovered prefix with a wordlist prefix.
const PERMUTATION_SEPARATORS: &[&str] = &["-", "."];

/// Hostname-looking tokens inside raw record data.
static RE_HOST_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_.-]*").unwrap());

/// Which phases of subdomain enumeration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SubdomainTechnique {
    /// DNS records, brute force and permutations.
    #[default]
    All,
    /// DNS records only.
    Dns,
    /// Brute force only.
    Bruteforce,
    /// Brute force followed by permutations.
    Permutations,
    /// Brute force and permutations over the caller's own prefixes.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Phases {
    dns: bool,
    bruteforce: bool,
    permutations: bool,
}

impl SubdomainTechnique {
    fn phases(self) -> Phases {
        match self {
            SubdomainTechnique::All => Phases { dns: true, bruteforce: true, permutations: true },
            SubdomainTechnique::Dns => Phases { dns: true, bruteforce: false, permutations: false },
            SubdomainTechnique::Bruteforce => Phases { dns: false, bruteforce: true, permutations: false },
            SubdomainTechnique::Permutations | SubdomainTechnique::Custom => {
                Phases { dns: false, bruteforce: true, permutations: true }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainOptions {
    pub technique: SubdomainTechnique,
    pub wordlist: SubdomainWordlist,
    /// Prefixes used when the wordlist or the technique is `custom`.
    pub custom_prefixes: Option<Vec<String>>,
}

impl SubdomainOptions {
    /// All phases over the wordlist tier matching a scan depth.
    pub fn for_depth(depth: u8) -> Self {
        Self {
            technique: SubdomainTechnique::All,
            wordlist: wordlists::subdomain_tier_for_depth(depth),
            custom_prefixes: None,
        }
    }

    /// The prefixes the brute-force and permutation phases work with.
    pub fn prefixes(&self) -> Result<Vec<String>, ValidationError> {
        let wants_custom =
            self.wordlist == SubdomainWordlist::Custom || self.technique == SubdomainTechnique::Custom;
        if !wants_custom {
            return Ok(wordlists::subdomain_prefixes(self.wordlist)
                .into_iter()
                .map(str::to_string)
                .collect());
        }

        let prefixes: Vec<String> = self
            .custom_prefixes
            .iter()
            .flatten()
            .map(|p| p.trim().trim_matches('.').to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if prefixes.is_empty() {
            return Err(ValidationError::MissingCustomWordlist);
        }
        Ok(prefixes)
    }
}

/// Runs subdomain enumeration against `domain`.
///
/// # Arguments
///
/// * `ctx` - Probes and configuration.
/// * `domain` - The base domain (not an IP literal).
/// * `options` - Technique, wordlist and custom prefixes.
///
/// # Returns
///
/// The discovered fully-qualified names, sorted and without duplicates.
/// Fails only on invalid input or when every enabled phase failed.
pub async fn run_subdomain_scan(ctx: &ScanContext, domain: &str, options: &SubdomainOptions) -> Result<Vec<String>> {
    let domain = normalise_domain(domain)?;
    let prefixes = options.prefixes()?;
    let phases = options.technique.phases();

    info!(target = %domain, technique = %options.technique, wordlist = %options.wordlist, "Starting subdomain scan.");

    let mut found = BTreeSet::new();
    let mut enabled = 0usize;
    let mut failed = 0usize;

    if phases.dns {
        enabled += 1;
        match dns_record_phase(ctx, &domain).await {
            Ok(names) => {
                debug!(count = %names.len(), "DNS record phase finished.");
                for name in names {
                    record_found(ctx, &mut found, &name);
                }
            }
            Err(e) => {
                warn!(target = %domain, error = %e, "DNS record phase failed.");
                failed += 1;
            }
        }
    }

    if phases.bruteforce {
        enabled += 1;
        let candidates: Vec<String> = prefixes.iter().map(|p| format!("{}.{}", p, domain)).collect();
        let resolved = resolve_batch(ctx, candidates, &mut found).await;
        debug!(count = %resolved.len(), "Brute-force phase finished.");

        if phases.permutations && !resolved.is_empty() {
            let candidates = permutation_candidates(&resolved, &prefixes, &domain, ctx.config.subdomain.max_permutations);
            debug!(candidates = %candidates.len(), "Starting permutation phase.");
            let permuted = resolve_batch(ctx, candidates, &mut found).await;
            debug!(count = %permuted.len(), "Permutation phase finished.");
        } else if phases.permutations {
            debug!("Brute force found nothing, skipping permutations.");
        }
    }

    if enabled > 0 && failed == enabled {
        return Err(ScanError::AllPhasesFailed("subdomain"));
    }

    info!(target = %domain, count = %found.len(), "Subdomain scan finished.");
    Ok(found.into_iter().collect())
}

fn normalise_domain(domain: &str) -> Result<String, ValidationError> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.parse::<IpAddr>().is_ok() {
        return Err(ValidationError::NotADomain(domain));
    }
    if !is_valid_domain(&domain) {
        return Err(ValidationError::InvalidTarget(domain));
    }
    Ok(domain)
}

/// Looks at the NS, MX and TXT records of `domain` for names below it.
/// Fails only if none of the record types could be looked up.
async fn dns_record_phase(ctx: &ScanContext, domain: &str) -> Result<BTreeSet<String>> {
    let kinds = [RecordKind::Ns, RecordKind::Mx, RecordKind::Txt];
    let mut names = BTreeSet::new();
    let mut last_error = None;
    let mut answered = 0usize;

    for kind in kinds {
        match ctx.probes.resolver.lookup_records(domain, kind).await {
            Ok(records) => {
                answered += 1;
                for record in &records {
                    names.extend(hostnames_in_record(record, domain));
                }
            }
            Err(e) => {
                debug!(kind = %kind, error = %e, "Record lookup failed.");
                last_error = Some(e);
            }
        }
    }

    match (answered, last_error) {
        (0, Some(e)) => Err(e.into()),
        _ => Ok(names),
    }
}

/// Hostnames embedded in raw record data that are subdomains of `domain`.
pub fn hostnames_in_record(record: &str, domain: &str) -> Vec<String> {
    let suffix = format!(".{}", domain);
    RE_HOST_TOKEN
        .find_iter(record)
        .map(|m| m.as_str().trim_end_matches('.').to_ascii_lowercase())
        .filter(|name| name.ends_with(&suffix) && is_valid_domain(name))
        .collect()
}

/// Combines every discovered prefix with every wordlist prefix, both ways
/// round, leaving out names already known.
pub fn permutation_candidates(found: &[String], prefixes: &[String], domain: &str, limit: usize) -> Vec<String> {
    let suffix = format!(".{}", domain);
    let discovered: BTreeSet<&str> = found.iter().filter_map(|name| name.strip_suffix(&suffix)).collect();
    let known: BTreeSet<&str> = found.iter().map(String::as_str).collect();

    let mut candidates = BTreeSet::new();
    for d in &discovered {
        for w in prefixes {
            if *d == w.as_str() {
                continue;
            }
            for sep in PERMUTATION_SEPARATORS {
                candidates.insert(format!("{d}{sep}{w}{suffix}"));
                candidates.insert(format!("{w}{sep}{d}{suffix}"));
            }
        }
    }

    candidates
        .into_iter()
        .filter(|c| !known.contains(c.as_str()) && is_valid_domain(c))
        .take(limit)
        .collect()
}

/// Adds `name` to the result set, reporting it the first time it is seen.
fn record_found(ctx: &ScanContext, found: &mut BTreeSet<String>, name: &str) {
    if found.insert(name.to_string()) {
        ctx.emit(None, FindingDetails::Subdomain(SubdomainDetails { domain: name.to_string() }));
    }
}

/// Resolves `candidates`, recording each name as its lookup succeeds.
async fn resolve_batch(ctx: &ScanContext, candidates: Vec<String>, found: &mut BTreeSet<String>) -> Vec<String> {
    let resolver = ctx.probes.resolver.clone();
    ctx.batcher(ctx.config.subdomain.batch_size, ctx.config.subdomain.resolver_timeout())
        .run_with(
            candidates,
            move |name: String| {
                let resolver = resolver.clone();
                async move { resolver.resolves(&name).await.then_some(name) }
            },
            |name: &String| record_found(ctx, found, name),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostnames_in_records() {
        let spf = "\"v=spf1 include:_spf.example.com include:mail.other.org ~all\"";
        assert_eq!(hostnames_in_record(spf, "example.com"), vec!["_spf.example.com"]);
        assert_eq!(hostnames_in_record("10 mx1.example.com.", "example.com"), vec!["mx1.example.com"]);
        assert!(hostnames_in_record("ns1.notexample.com.", "example.com").is_empty());
        assert!(hostnames_in_record("example.com.", "example.com").is_empty());
    }

    #[test]
    fn test_permutations_both_orders_and_separators() {
        let found = vec!["dev.example.com".to_string()];
        let prefixes = vec!["api".to_string(), "dev".to_string()];
        let candidates = permutation_candidates(&found, &prefixes, "example.com", 100);
        assert_eq!(
            candidates,
            vec![
                "api-dev.example.com",
                "api.dev.example.com",
                "dev-api.example.com",
                "dev.api.example.com",
            ]
        );
        assert_eq!(permutation_candidates(&found, &prefixes, "example.com", 1).len(), 1);
    }

    #[test]
    fn test_custom_prefixes_are_required() {
        let options = SubdomainOptions { wordlist: SubdomainWordlist::Custom, ..Default::default() };
        assert_eq!(options.prefixes(), Err(ValidationError::MissingCustomWordlist));

        let options = SubdomainOptions {
            technique: SubdomainTechnique::Custom,
            wordlist: SubdomainWordlist::Default,
            custom_prefixes: Some(vec![" Foo ".into(), "foo".into(), "".into(), "bar".into()]),
        };
        assert_eq!(options.prefixes().unwrap(), vec!["bar", "foo"]);
    }

    #[test]
    fn test_technique_phases() {
        assert!(!SubdomainTechnique::Dns.phases().bruteforce);
        assert!(SubdomainTechnique::Permutations.phases().bruteforce);
        assert!(!SubdomainTechnique::Custom.phases().dns);
        assert_eq!("BRUTEFORCE".parse::<SubdomainTechnique>().ok(), Some(SubdomainTechnique::Bruteforce));
    }

    #[test]
    fn test_domain_must_not_be_an_ip() {
        assert!(matches!(normalise_domain("10.0.0.1"), Err(ValidationError::NotADomain(_))));
        assert_eq!(normalise_domain("Example.COM.").unwrap(), "example.com");
    }
}
