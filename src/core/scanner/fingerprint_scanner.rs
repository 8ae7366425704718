// src/core/scanner/fingerprint_scanner.rs

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::ScanContext;
use crate::core::error::Result;
use crate::core::models::{FindingDetails, Target, TechnologyDetails};
use crate::core::probe::PageSnapshot;
use crate::core::signatures::{CompiledCatalog, CompiledTechnology, MatchLocation};

/// Runs technology detection against the page at `url`.
///
/// It fetches the page once, then applies the catalog's rules to the response
/// headers, cookies and body to identify the technologies in use.
///
/// # Arguments
/// * `ctx` - Probes and the compiled signature catalog.
/// * `url` - The page to fingerprint.
///
/// # Returns
/// The detected technologies, most confident first.
pub async fn run_tech_detection(ctx: &ScanContext, url: &str) -> Result<Vec<TechnologyDetails>> {
    let target = Target::parse(url)?;
    info!(target = %target.base_url, "Starting fingerprint scan.");

    let page = ctx.fetch_target_page(&target.base_url).await?;
    let technologies = detect_technologies(&ctx.catalog, &page);
    for technology in &technologies {
        ctx.emit(None, FindingDetails::Technology(technology.clone()));
    }

    info!(count = %technologies.len(), "Fingerprint scan finished.");
    Ok(technologies)
}

/// Applies every technology rule of `catalog` to a fetched page.
///
/// Regular rules always run. On-demand rules run only for the categories a
/// coverage rule asks for, given the categories the regular rules matched.
/// Matches are merged by name, keeping the highest confidence and the first
/// version seen.
pub fn detect_technologies(catalog: &CompiledCatalog, page: &PageSnapshot) -> Vec<TechnologyDetails> {
    let document = Html::parse_document(&page.body);
    let cookies = page.cookies().join("; ");
    let mut found: HashMap<String, TechnologyDetails> = HashMap::new();

    debug!(total_rules = %catalog.technologies.len(), "Applying fingerprinting rules.");
    for rule in catalog.technologies.iter().filter(|r| !r.on_demand) {
        apply_rule(rule, page, &document, &cookies, &mut found);
    }

    let matched_categories: HashSet<&str> = found.values().map(|t| t.category.as_str()).collect();
    let ensured: HashSet<String> = catalog
        .coverage
        .iter()
        .filter(|c| matched_categories.contains(c.when_category.as_str()))
        .map(|c| c.ensure_category.clone())
        .collect();

    if !ensured.is_empty() {
        debug!(categories = ?ensured, "Running baseline checks.");
        for rule in catalog
            .technologies
            .iter()
            .filter(|r| r.on_demand && ensured.contains(&r.category))
        {
            apply_rule(rule, page, &document, &cookies, &mut found);
        }
    }

    let mut technologies: Vec<TechnologyDetails> = found.into_values().collect();
    technologies.sort_by(|a, b| b.confidence.cmp(&a.confidence).then_with(|| a.name.cmp(&b.name)));
    technologies
}

fn apply_rule(
    rule: &CompiledTechnology,
    page: &PageSnapshot,
    document: &Html,
    cookies: &str,
    found: &mut HashMap<String, TechnologyDetails>,
) {
    let version = match &rule.location {
        MatchLocation::Header { name } => check_with_regex(page.header(name), &rule.regex),
        MatchLocation::MetaTag { name } => check_meta_tag(document, name, &rule.regex),
        MatchLocation::Body => check_with_regex(Some(&page.body), &rule.regex),
        MatchLocation::ScriptSrc => check_attribute(document, "script[src]", "src", &rule.regex),
        MatchLocation::LinkHref => check_attribute(document, "link[href]", "href", &rule.regex),
        MatchLocation::Cookie => check_with_regex(Some(cookies), &rule.regex),
    };

    let Some(version) = version else { return };
    debug!(tech = %rule.name, version = ?version, "Rule matched.");

    match found.get_mut(&rule.name) {
        Some(existing) => {
            existing.confidence = existing.confidence.max(rule.confidence);
            if existing.version.is_none() && version.is_some() {
                existing.version = version;
            }
        }
        None => {
            found.insert(
                rule.name.clone(),
                TechnologyDetails {
                    name: rule.name.clone(),
                    category: rule.category.clone(),
                    version,
                    confidence: rule.confidence,
                },
            );
        }
    }
}

/// Applies a regex to an optional string slice.
///
/// Returns `Some(version)` if the regex matches, where `version` is the first
/// non-empty capture group, and `None` if the pattern did not match at all.
fn check_with_regex(text_option: Option<&str>, re: &Regex) -> Option<Option<String>> {
    text_option.and_then(|text| {
        re.captures(text).map(|caps| {
            caps.get(1)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
        })
    })
}

fn check_meta_tag(doc: &Html, name: &str, re: &Regex) -> Option<Option<String>> {
    let selector = Selector::parse(&format!("meta[name='{}']", name)).ok()?;
    let content = doc.select(&selector).next().and_then(|el| el.value().attr("content"));
    check_with_regex(content, re)
}

/// First element matching `selector` whose `attr` matches the regex.
fn check_attribute(doc: &Html, selector: &str, attr: &str, re: &Regex) -> Option<Option<String>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .find_map(|value| check_with_regex(Some(value), re))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signatures::{CoverageRule, SignatureCatalog, TechnologySignature};
    use reqwest::header::{HeaderMap, HeaderValue};
    use url::Url;

    fn page(headers: &[(&'static str, &'static str)], body: &str) -> PageSnapshot {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        PageSnapshot {
            url: Url::parse("https://example.com/").unwrap(),
            status_code: 200,
            headers: map,
            body: body.to_string(),
        }
    }

    fn sig(name: &str, category: &str, location: MatchLocation, pattern: &str, confidence: u8, on_demand: bool) -> TechnologySignature {
        TechnologySignature {
            name: name.into(),
            category: category.into(),
            location,
            pattern: pattern.into(),
            confidence,
            on_demand,
        }
    }

    fn catalog() -> CompiledCatalog {
        CompiledCatalog::compile(&SignatureCatalog {
            technologies: vec![
                sig("Nginx", "Web Server", MatchLocation::Header { name: "server".into() }, r"nginx/([\d\.]+)", 90, false),
                sig("Nginx", "Web Server", MatchLocation::Body, r"<center>nginx</center>", 60, false),
                sig("React", "JS Framework", MatchLocation::ScriptSrc, r"react-dom", 80, false),
                sig("Lodash", "JS Library", MatchLocation::Body, r"lodash", 50, true),
                sig("PHP", "Language", MatchLocation::Cookie, r"PHPSESSID", 70, false),
            ],
            coverage: vec![CoverageRule { when_category: "JS Framework".into(), ensure_category: "JS Library".into() }],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_merges_by_name_and_sorts_by_confidence() {
        let page = page(
            &[("server", "nginx/1.25.3"), ("set-cookie", "PHPSESSID=abc; path=/")],
            "<html><body><center>nginx</center></body></html>",
        );
        let found = detect_technologies(&catalog(), &page);
        let names: Vec<&str> = found.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Nginx", "PHP"]);
        assert_eq!(found[0].version.as_deref(), Some("1.25.3"));
        assert_eq!(found[0].confidence, 90);
    }

    #[test]
    fn test_baseline_runs_only_when_covered() {
        let body = r#"<script src="/static/react-dom.min.js"></script><script>window.lodash = 1</script>"#;
        let found = detect_technologies(&catalog(), &page(&[], body));
        assert!(found.iter().any(|t| t.name == "Lodash"));

        let found = detect_technologies(&catalog(), &page(&[], "<script>lodash</script>"));
        assert!(found.is_empty());
    }
}
