// src/core/scanner/parameter_scanner.rs

use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use super::ScanContext;
use crate::core::error::Result;
use crate::core::models::{FindingDetails, ParameterDetails, Target};
use crate::core::probe::PageSnapshot;

/// Source label of parameters read from a URL query string.
pub const QUERY_SOURCE: &str = "query";
/// Source label of catalog names referenced in inline scripts.
pub const CANDIDATE_SOURCE: &str = "candidate";

/// Discovers the request parameters a page accepts.
///
/// # Arguments
/// * `ctx` - Probes and the compiled catalog (for the common names).
/// * `url` - The page to inspect.
///
/// # Returns
/// One entry per parameter name, sorted by name.
pub async fn run_parameter_discovery(ctx: &ScanContext, url: &str) -> Result<Vec<ParameterDetails>> {
    let target = Target::parse(url)?;
    info!(target = %target.base_url, "Starting parameter discovery.");

    let page = ctx.fetch_target_page(&target.base_url).await?;
    let parameters = extract_parameters(&ctx.catalog.parameters, &page);
    for parameter in &parameters {
        ctx.emit(None, FindingDetails::Parameter(parameter.clone()));
    }

    info!(count = %parameters.len(), "Parameter discovery finished.");
    Ok(parameters)
}

/// Collects form controls, query parameters of the page and its same-host
/// links, and common names mentioned by inline scripts. The first source a
/// name is seen in wins.
pub fn extract_parameters(common_names: &[String], page: &PageSnapshot) -> Vec<ParameterDetails> {
    let document = Html::parse_document(&page.body);
    let mut found: BTreeMap<String, String> = BTreeMap::new();

    for (name, kind) in form_controls(&document) {
        found.entry(name).or_insert(kind);
    }

    let mut urls = vec![page.url.clone()];
    urls.extend(same_host_links(&document, &page.url));
    for url in &urls {
        for (name, _) in url.query_pairs() {
            if !name.is_empty() {
                found.entry(name.into_owned()).or_insert_with(|| QUERY_SOURCE.to_string());
            }
        }
    }

    let scripts = inline_scripts(&document);
    for name in common_names.iter().filter(|n| mentions(&scripts, n)) {
        found.entry(name.clone()).or_insert_with(|| CANDIDATE_SOURCE.to_string());
    }

    debug!(links = %urls.len().saturating_sub(1), "Parameters extracted.");
    found.into_iter().map(|(name, kind)| ParameterDetails { name, kind }).collect()
}

/// Named form controls. Inputs report their `type` (default `text`),
/// other controls their tag name.
fn form_controls(document: &Html) -> Vec<(String, String)> {
    let Ok(selector) = Selector::parse("input[name], select[name], textarea[name]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| {
            let name = el.value().attr("name")?.trim();
            if name.is_empty() {
                return None;
            }
            let tag = el.value().name();
            let kind = if tag == "input" {
                el.value().attr("type").unwrap_or("text").to_ascii_lowercase()
            } else {
                tag.to_string()
            };
            Some((name.to_string(), kind))
        })
        .collect()
}

fn same_host_links(document: &Html, base: &Url) -> Vec<Url> {
    let Ok(selector) = Selector::parse("a[href], form[action]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("action")))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| url.host_str() == base.host_str())
        .collect()
}

fn inline_scripts(document: &Html) -> String {
    let Ok(selector) = Selector::parse("script:not([src])") else {
        return String::new();
    };
    document.select(&selector).flat_map(|el| el.text()).collect::<Vec<_>>().join("\n")
}

/// Whether `name` occurs in `text` as a whole identifier.
fn mentions(text: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(name).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}
