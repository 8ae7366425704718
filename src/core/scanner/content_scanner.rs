// src/core/scanner/content_scanner.rs

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use url::Url;

use super::ScanContext;
use crate::core::error::{Result, ValidationError};
use crate::core::models::{DirectoryDetails, FindingDetails, Target};
use crate::core::wordlists::{self, ContentWordlist, RECURSION_SUBDIRS};

/// Statuses that make an extensionless path count as a directory.
const DIRECTORY_STATUSES: &[u16] = &[200, 301, 302, 307, 308, 401, 403];

#[derive(Debug, Clone, PartialEq)]
pub struct ContentOptions {
    pub wordlist: ContentWordlist,
    pub recursive: bool,
    /// Normalised extensions (`.php`); the bare path is always probed too.
    pub extensions: Vec<String>,
    pub concurrency: usize,
    /// Accepted statuses; the configured set when `None`.
    pub accepted_statuses: Option<Vec<u16>>,
}

impl ContentOptions {
    pub fn for_depth(depth: u8, concurrency: usize) -> Self {
        let extensions = if depth >= 3 { vec![".php".into(), ".html".into(), ".txt".into()] } else { Vec::new() };
        Self {
            wordlist: wordlists::content_tier_for_depth(depth),
            recursive: depth >= 4,
            extensions,
            concurrency,
            accepted_statuses: None,
        }
    }
}

/// Parses a comma-separated extension list into `.ext` form.
pub fn parse_extensions(raw: &str) -> Result<Vec<String>, ValidationError> {
    let mut extensions = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let ext = token.trim_start_matches('.');
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidExtension(token.to_string()));
        }
        let ext = format!(".{}", ext.to_ascii_lowercase());
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    Ok(extensions)
}

/// Parses a comma-separated list of HTTP status codes.
pub fn parse_status_filter(raw: &str) -> Result<Vec<u16>, ValidationError> {
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(code),
            _ => Err(ValidationError::InvalidStatusFilter(t.to_string())),
        })
        .collect::<Result<BTreeSet<u16>, _>>()?;

    if statuses.is_empty() {
        return Err(ValidationError::InvalidStatusFilter(raw.to_string()));
    }
    Ok(statuses.into_iter().collect())
}

/// Base paths crossed with the extensions. Paths whose last segment already
/// has an extension are only probed as they are.
pub fn candidate_paths(paths: &[&str], extensions: &[String]) -> Vec<String> {
    let mut candidates = BTreeSet::new();
    for path in paths {
        let path = format!("/{}", path.trim_start_matches('/'));
        candidates.insert(path.clone());
        if !has_extension(&path) {
            for ext in extensions {
                candidates.insert(format!("{}{}", path, ext));
            }
        }
    }
    candidates.into_iter().collect()
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}

fn is_directory_hit(entry: &DirectoryDetails) -> bool {
    !has_extension(&entry.path) && DIRECTORY_STATUSES.contains(&entry.status_code)
}

/// Picks, for each directory hit, at most one subdirectory to re-probe.
fn recursion_candidates(hits: &[&str], probability: f64) -> Vec<String> {
    let probability = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
    let mut rng = rand::thread_rng();
    let mut nested = Vec::new();
    for hit in hits {
        if !rng.gen_bool(probability) {
            continue;
        }
        if let Some(sub) = RECURSION_SUBDIRS.choose(&mut rng) {
            nested.push(format!("{}/{}", hit.trim_end_matches('/'), sub));
        }
    }
    nested
}

/// Runs content discovery below `url`.
///
/// # Returns
///
/// Every probed path whose status is in the accepted set, sorted by path.
pub async fn run_content_discovery(ctx: &ScanContext, url: &str, options: &ContentOptions) -> Result<Vec<DirectoryDetails>> {
    let base_url = Target::parse(url)?.base_url;
    let accepted: BTreeSet<u16> = options
        .accepted_statuses
        .clone()
        .unwrap_or_else(|| ctx.config.content.accepted_statuses.clone())
        .into_iter()
        .collect();

    let candidates = candidate_paths(&wordlists::content_paths(options.wordlist), &options.extensions);
    info!(
        target = %base_url,
        candidates = %candidates.len(),
        wordlist = %options.wordlist,
        recursive = %options.recursive,
        "Starting content discovery."
    );

    let mut reported = BTreeSet::new();
    let responses = probe_paths(ctx, &base_url, candidates, options.concurrency, &accepted, &mut reported).await;

    let mut found: BTreeMap<String, DirectoryDetails> = BTreeMap::new();
    if options.recursive {
        let hits: Vec<&str> = responses.iter().filter(|r| is_directory_hit(r)).map(|r| r.path.as_str()).collect();
        let nested = recursion_candidates(&hits, ctx.config.content.recursion_probability);
        debug!(hits = %hits.len(), nested = %nested.len(), "Recursing one level below directory hits.");
        if !nested.is_empty() {
            let nested_responses =
                probe_paths(ctx, &base_url, nested, options.concurrency, &accepted, &mut reported).await;
            found.extend(nested_responses.into_iter().map(|r| (r.path.clone(), r)));
        }
    }
    found.extend(responses.into_iter().map(|r| (r.path.clone(), r)));

    let results: Vec<DirectoryDetails> = found.into_values().filter(|r| accepted.contains(&r.status_code)).collect();
    info!(target = %base_url, count = %results.len(), "Content discovery finished.");
    Ok(results)
}

/// Probes `paths`, reporting each accepted answer once as it arrives.
async fn probe_paths(
    ctx: &ScanContext,
    base_url: &Url,
    paths: Vec<String>,
    concurrency: usize,
    accepted: &BTreeSet<u16>,
    reported: &mut BTreeSet<String>,
) -> Vec<DirectoryDetails> {
    let http = ctx.probes.http.clone();
    let base = base_url.clone();
    let report = |entry: &DirectoryDetails| {
        if accepted.contains(&entry.status_code) && reported.insert(entry.path.clone()) {
            ctx.emit(None, FindingDetails::Directory(entry.clone()));
        }
    };
    let probe = move |path: String| {
        let http = http.clone();
        let base = base.clone();
        async move {
            match http.probe_path(&base, &path).await {
                Ok(response) => Some(DirectoryDetails {
                    path,
                    status_code: response.status_code,
                    content_type: response.content_type,
                    content_length: response.content_length,
                }),
                Err(e) => {
                    debug!(path = %path, error = %e, "Path probe failed.");
                    None
                }
            }
        }
    };
    ctx.batcher(concurrency, ctx.config.batch.probe_timeout())
        .run_with(paths, probe, report)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions("php, .HTML,,php").unwrap(), vec![".php", ".html"]);
        assert!(parse_extensions("").unwrap().is_empty());
        assert!(parse_extensions("ph/p").is_err());
        assert!(parse_extensions(".").is_err());
    }

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter("403, 200,200").unwrap(), vec![200, 403]);
        assert!(parse_status_filter("").is_err());
        assert!(parse_status_filter("200,99").is_err());
        assert!(parse_status_filter("ok").is_err());
    }

    #[test]
    fn test_candidates_skip_extensions_on_files() {
        let exts = vec![".php".to_string()];
        let candidates = candidate_paths(&["admin", "robots.txt", "/api/v1"], &exts);
        assert_eq!(candidates, vec!["/admin", "/admin.php", "/api/v1", "/api/v1.php", "/robots.txt"]);
    }

    #[test]
    fn test_directory_hits() {
        let entry = |path: &str, status_code| DirectoryDetails {
            path: path.into(),
            status_code,
            content_type: None,
            content_length: None,
        };
        assert!(is_directory_hit(&entry("/admin", 403)));
        assert!(!is_directory_hit(&entry("/admin", 404)));
        assert!(!is_directory_hit(&entry("/index.php", 200)));
    }

    #[test]
    fn test_recursion_probability_bounds() {
        let hits = ["/admin", "/backup/"];
        assert!(recursion_candidates(&hits, 0.0).is_empty());
        let nested = recursion_candidates(&hits, 1.0);
        assert_eq!(nested.len(), 2);
        assert!(nested.iter().all(|p| RECURSION_SUBDIRS.iter().any(|s| p.ends_with(s))));
        assert!(nested[1].starts_with("/backup/") && !nested[1].contains("//"));
        assert!(recursion_candidates(&hits, f64::NAN).is_empty());
    }
}
