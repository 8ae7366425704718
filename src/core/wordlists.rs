// src/core/wordlists.rs

//! Static candidate lists. Every tier is a superset of the tier below it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Size tier of the subdomain prefix list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SubdomainWordlist {
    #[default]
    Default,
    Common,
    Large,
    /// Caller-supplied prefixes.
    Custom,
}

/// Size tier of the content discovery path list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContentWordlist {
    #[default]
    Small,
    Medium,
    Large,
}

static SUBDOMAINS_DEFAULT: &[&str] = &[
    "www", "mail", "ftp", "admin", "api", "dev", "test", "staging", "blog", "shop", "portal",
    "vpn", "remote", "webmail", "ns1", "ns2", "smtp", "m", "app", "cdn",
];

static SUBDOMAINS_COMMON: &[&str] = &[
    "beta", "demo", "docs", "help", "support", "status", "static", "assets", "img", "images",
    "media", "files", "download", "git", "gitlab", "jenkins", "ci", "jira", "wiki", "intranet",
    "internal", "secure", "login", "auth", "sso", "accounts", "dashboard", "panel", "cpanel", "mx",
];

static SUBDOMAINS_LARGE: &[&str] = &[
    "api2", "api-v1", "v1", "v2", "old", "new", "legacy", "backup", "db", "mysql", "sql",
    "redis", "elastic", "kibana", "grafana", "prometheus", "monitor", "metrics", "logs", "sentry",
    "vault", "proxy", "gateway", "edge", "origin", "lb", "k8s", "kube", "docker", "registry",
    "s3", "storage", "uploads", "mobile", "partners", "crm", "erp", "hr", "pay", "payments",
    "billing", "checkout", "store", "news", "events", "forum", "community", "chat", "meet", "video",
];

static PATHS_SMALL: &[&str] = &[
    "admin", "login", "dashboard", "api", "uploads", "images", "css", "js", "backup", "config",
    "robots.txt", "sitemap.xml", ".git/HEAD", ".env", "server-status",
];

static PATHS_MEDIUM: &[&str] = &[
    "administrator", "wp-admin", "wp-login.php", "phpmyadmin", "test", "tmp", "temp", "old",
    "dev", "staging", "static", "assets", "media", "files", "download", "downloads", "docs",
    "swagger", "swagger-ui", "graphql", "console", "status", "health", "metrics", "private",
];

static PATHS_LARGE: &[&str] = &[
    "api/v1", "api/v2", "v1", "v2", "cgi-bin", "includes", "lib", "vendor", "node_modules",
    "logs", "log", "db", "database", "sql", "dump", "export", "import", "install", "setup",
    "cache", "data", "portal", "account", "accounts", "user", "users", "profile", "register",
    "signup", "logout", "reset", "password", "auth", "oauth", "sso", ".svn/entries", ".htaccess",
    ".DS_Store", "web.config", "crossdomain.xml", "composer.json", "package.json", "README.md",
];

/// Subdomain prefixes for a tier. `Custom` has no built-in list.
pub fn subdomain_prefixes(tier: SubdomainWordlist) -> Vec<&'static str> {
    let tiers: &[&[&str]] = match tier {
        SubdomainWordlist::Default => &[SUBDOMAINS_DEFAULT],
        SubdomainWordlist::Common => &[SUBDOMAINS_DEFAULT, SUBDOMAINS_COMMON],
        SubdomainWordlist::Large => &[SUBDOMAINS_DEFAULT, SUBDOMAINS_COMMON, SUBDOMAINS_LARGE],
        SubdomainWordlist::Custom => &[],
    };
    tiers.iter().flat_map(|t| t.iter().copied()).collect()
}

pub fn content_paths(tier: ContentWordlist) -> Vec<&'static str> {
    let tiers: &[&[&str]] = match tier {
        ContentWordlist::Small => &[PATHS_SMALL],
        ContentWordlist::Medium => &[PATHS_SMALL, PATHS_MEDIUM],
        ContentWordlist::Large => &[PATHS_SMALL, PATHS_MEDIUM, PATHS_LARGE],
    };
    tiers.iter().flat_map(|t| t.iter().copied()).collect()
}

/// Subdirectory names tried once below a directory hit when recursing.
pub static RECURSION_SUBDIRS: &[&str] = &["admin", "backup", "config", "uploads"];

/// Subdomain tier for a scan depth.
pub fn subdomain_tier_for_depth(depth: u8) -> SubdomainWordlist {
    match depth {
        0..=2 => SubdomainWordlist::Default,
        3..=4 => SubdomainWordlist::Common,
        _ => SubdomainWordlist::Large,
    }
}

/// Content tier for a scan depth.
pub fn content_tier_for_depth(depth: u8) -> ContentWordlist {
    match depth {
        0..=2 => ContentWordlist::Small,
        3..=4 => ContentWordlist::Medium,
        _ => ContentWordlist::Large,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tiers_grow() {
        let default = subdomain_prefixes(SubdomainWordlist::Default);
        let common = subdomain_prefixes(SubdomainWordlist::Common);
        let large = subdomain_prefixes(SubdomainWordlist::Large);
        assert!(default.len() < common.len() && common.len() < large.len());
        assert!(default.iter().all(|p| common.contains(p)));
        assert!(subdomain_prefixes(SubdomainWordlist::Custom).is_empty());
        assert!(content_paths(ContentWordlist::Small).len() < content_paths(ContentWordlist::Large).len());
    }

    #[test]
    fn test_lists_have_no_duplicates() {
        let large = subdomain_prefixes(SubdomainWordlist::Large);
        assert_eq!(large.iter().collect::<HashSet<_>>().len(), large.len());
        let paths = content_paths(ContentWordlist::Large);
        assert_eq!(paths.iter().collect::<HashSet<_>>().len(), paths.len());
    }

    #[test]
    fn test_depth_mapping() {
        assert_eq!(subdomain_tier_for_depth(2), SubdomainWordlist::Default);
        assert_eq!(subdomain_tier_for_depth(3), SubdomainWordlist::Common);
        assert_eq!(content_tier_for_depth(5), ContentWordlist::Large);
    }
}
