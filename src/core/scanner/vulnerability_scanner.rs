// src/core/scanner/vulnerability_scanner.rs

use std::collections::HashSet;
use tracing::{debug, info};

use super::ScanContext;
use crate::core::error::Result;
use crate::core::models::{FindingDetails, Target, VulnerabilityDetails, VulnerabilityMatch};
use crate::core::probe::PageSnapshot;
use crate::core::signatures::{CompiledCatalog, CompiledCheck};

/// Flags weaknesses visible in the response for `url`.
///
/// # Returns
/// The matched vulnerabilities, most severe first. Fails with
/// `TargetUnreachable` if the page cannot be fetched.
pub async fn run_vulnerability_scan(ctx: &ScanContext, url: &str) -> Result<Vec<VulnerabilityMatch>> {
    let target = Target::parse(url)?;
    info!(target = %target.base_url, "Starting vulnerability scan.");

    let page = ctx.fetch_target_page(&target.base_url).await?;
    let found = evaluate_vulnerabilities(&ctx.catalog, &page);
    for v in &found {
        let details = VulnerabilityDetails { kind: v.kind.clone(), description: v.description.clone() };
        ctx.emit(Some(v.severity), FindingDetails::Vulnerability(details));
    }

    info!(count = %found.len(), "Vulnerability scan finished.");
    Ok(found)
}

/// Evaluates every vulnerability rule of `catalog` against one page.
pub fn evaluate_vulnerabilities(catalog: &CompiledCatalog, page: &PageSnapshot) -> Vec<VulnerabilityMatch> {
    let mut seen = HashSet::new();
    let mut found: Vec<VulnerabilityMatch> = catalog
        .vulnerabilities
        .iter()
        .filter(|rule| check_matches(&rule.check, page))
        .filter(|rule| seen.insert(rule.kind.clone()))
        .map(|rule| {
            debug!(kind = %rule.kind, severity = %rule.severity, "Vulnerability rule matched.");
            VulnerabilityMatch {
                kind: rule.kind.clone(),
                description: rule.description.clone(),
                severity: rule.severity,
            }
        })
        .collect();

    found.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.kind.cmp(&b.kind)));
    found
}

fn check_matches(check: &CompiledCheck, page: &PageSnapshot) -> bool {
    match check {
        CompiledCheck::MissingHeader(name) => page.header(name).is_none(),
        CompiledCheck::HeaderMatches(name, re) => page.header(name).is_some_and(|v| re.is_match(v)),
        CompiledCheck::BodyMatches(re) => re.is_match(&page.body),
        CompiledCheck::CookieMissingFlag(flag) => page.cookies().iter().any(|c| !cookie_has_flag(c, flag)),
        CompiledCheck::InsecureScheme => page.url.scheme() == "http",
    }
}

/// Whether a `set-cookie` value carries attribute `flag` (lowercase).
fn cookie_has_flag(cookie: &str, flag: &str) -> bool {
    cookie.split(';').skip(1).any(|attr| {
        let name = attr.split('=').next().unwrap_or_default();
        name.trim().eq_ignore_ascii_case(flag)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Severity;
    use crate::core::signatures::{SignatureCatalog, VulnerabilityRule, VulnerabilitySignature};
    use reqwest::header::{HeaderMap, HeaderValue};
    use url::Url;

    fn catalog() -> CompiledCatalog {
        let sig = |kind: &str, severity, rule| VulnerabilitySignature {
            kind: kind.into(),
            description: format!("{kind} found"),
            severity,
            rule,
        };
        CompiledCatalog::compile(&SignatureCatalog {
            vulnerabilities: vec![
                sig("Missing HSTS", Severity::Medium, VulnerabilityRule::MissingHeader { header: "Strict-Transport-Security".into() }),
                sig("Insecure Transport", Severity::High, VulnerabilityRule::InsecureScheme),
                sig("Cookie Without HttpOnly", Severity::Medium, VulnerabilityRule::CookieMissingFlag { flag: "HttpOnly".into() }),
                sig("Server Version Disclosure", Severity::Low, VulnerabilityRule::HeaderMatches {
                    header: "Server".into(),
                    pattern: r"/\d".into(),
                }),
                sig("SQL Error Disclosure", Severity::High, VulnerabilityRule::BodyMatches { pattern: "SQL syntax".into() }),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    fn page(url: &str, headers: &[(&'static str, &'static str)], body: &str) -> PageSnapshot {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        PageSnapshot { url: Url::parse(url).unwrap(), status_code: 200, headers: map, body: body.into() }
    }

    #[test]
    fn test_flags_sorted_by_severity() {
        let page = page(
            "http://example.com/",
            &[("server", "Apache/2.4.1"), ("set-cookie", "sid=1; Secure")],
            "You have an error in your SQL syntax",
        );
        let kinds: Vec<String> = evaluate_vulnerabilities(&catalog(), &page).into_iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                "Insecure Transport",
                "SQL Error Disclosure",
                "Cookie Without HttpOnly",
                "Missing HSTS",
                "Server Version Disclosure",
            ]
        );
    }

    #[test]
    fn test_hardened_page_is_clean() {
        let page = page(
            "https://example.com/",
            &[
                ("strict-transport-security", "max-age=63072000"),
                ("server", "nginx"),
                ("set-cookie", "sid=1; Secure; HttpOnly; SameSite=Lax"),
            ],
            "<html></html>",
        );
        assert!(evaluate_vulnerabilities(&catalog(), &page).is_empty());
    }

    #[test]
    fn test_cookie_flags() {
        assert!(cookie_has_flag("a=b; Path=/; HttpOnly", "httponly"));
        assert!(!cookie_has_flag("httponly=1; Path=/", "httponly"));
    }
}
