//! This module acts as the static, read-only knowledge of the engine.
//! It holds the port→service table, the banner grammars, the representative
//! banners used when no live banner can be captured, and the built-in
//! signature catalog. Keeping this data-driven lets the matching machinery
//! stay independent of its contents.

use crate::core::models::Severity;
use crate::core::signatures::{
    CoverageRule, MatchLocation, SignatureCatalog, TechnologySignature, VulnerabilityRule,
    VulnerabilitySignature,
};

// --- Ports and services ---

/// Well-known TCP ports and the service usually listening on them.
/// This is also the "common ports" list of the port strategy.
static PORT_SERVICES: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (111, "rpcbind"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (465, "smtps"),
    (587, "submission"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (1521, "oracle"),
    (2049, "nfs"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8080, "http-proxy"),
    (8443, "https-alt"),
    (9200, "elasticsearch"),
    (27017, "mongodb"),
];

pub fn service_for_port(port: u16) -> Option<&'static str> {
    PORT_SERVICES.iter().find(|(p, _)| *p == port).map(|(_, s)| *s)
}

pub fn common_ports() -> Vec<u16> {
    PORT_SERVICES.iter().map(|(p, _)| *p).collect()
}

/// How a banner can be read from a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerGrammar {
    /// The server speaks first; the first line is the banner.
    Greeting,
    /// Send a `HEAD` request and take the `Server` header.
    HttpHead,
}

pub fn banner_grammar(service: &str) -> Option<BannerGrammar> {
    match service {
        "ftp" | "ssh" | "smtp" | "pop3" | "imap" | "submission" => Some(BannerGrammar::Greeting),
        "http" | "http-alt" | "http-proxy" => Some(BannerGrammar::HttpHead),
        _ => None,
    }
}

/// Typical banners per service, used only when live capture yields nothing.
static REPRESENTATIVE_BANNERS: &[(&str, &str)] = &[
    ("ftp", "220 (vsFTPd 3.0.5)"),
    ("ssh", "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6"),
    ("smtp", "220 mail.local ESMTP Postfix"),
    ("submission", "220 mail.local ESMTP Postfix"),
    ("pop3", "+OK Dovecot ready."),
    ("imap", "* OK [CAPABILITY IMAP4rev1] Dovecot ready."),
    ("http", "Apache/2.4.57 (Debian)"),
    ("http-alt", "nginx/1.24.0"),
    ("http-proxy", "nginx/1.24.0"),
    ("https", "nginx/1.24.0"),
    ("mysql", "8.0.36 MySQL Community Server - GPL"),
    ("postgresql", "PostgreSQL 15"),
    ("redis", "Redis 7.2.4"),
];

pub fn representative_banner(service: &str) -> Option<&'static str> {
    REPRESENTATIVE_BANNERS.iter().find(|(s, _)| *s == service).map(|(_, b)| *b)
}

// --- Built-in signature catalog ---

enum Loc {
    Header(&'static str),
    MetaTag(&'static str),
    Body,
    ScriptSrc,
    LinkHref,
    Cookie,
}

struct TechRule {
    name: &'static str,
    category: &'static str,
    location: Loc,
    pattern: &'static str,
    confidence: u8,
    on_demand: bool,
}

const fn rule(name: &'static str, category: &'static str, location: Loc, pattern: &'static str, confidence: u8) -> TechRule {
    TechRule { name, category, location, pattern, confidence, on_demand: false }
}

const fn baseline(name: &'static str, pattern: &'static str, confidence: u8) -> TechRule {
    TechRule { name, category: "JS Library", location: Loc::Body, pattern, confidence, on_demand: true }
}

/// The master list of fingerprinting rules.
static TECH_RULES: &[TechRule] = &[
    rule("Nginx", "Web Server", Loc::Header("server"), r"(?i)nginx(?:/([\d.]+))?", 100),
    rule("Nginx", "Web Server", Loc::Body, r"<hr><center>nginx</center>", 70),
    rule("Apache", "Web Server", Loc::Header("server"), r"Apache(?:/([\d.]+))?", 100),
    rule("Apache", "Web Server", Loc::Body, r"Apache Server at", 70),
    rule("Microsoft IIS", "Web Server", Loc::Header("server"), r"Microsoft-IIS(?:/([\d.]+))?", 100),
    rule("LiteSpeed", "Web Server", Loc::Header("server"), r"LiteSpeed", 100),
    rule("Cloudflare", "CDN / WAF", Loc::Header("server"), r"(?i)cloudflare", 100),
    rule("WordPress", "CMS", Loc::MetaTag("generator"), r"WordPress ?([\d.]+)?", 100),
    rule("WordPress", "CMS", Loc::Body, r"/wp-content/|/wp-includes/", 80),
    rule("WordPress", "CMS", Loc::Body, r"wp-login\.php", 60),
    rule("Joomla", "CMS", Loc::MetaTag("generator"), r"Joomla!", 100),
    rule("Drupal", "CMS", Loc::Header("x-generator"), r"Drupal ?([\d.]+)?", 100),
    rule("Shopify", "E-commerce", Loc::Header("x-shopid"), r".+", 100),
    rule("Magento", "E-commerce", Loc::Cookie, r"(?i)magento|mage-cache", 75),
    rule("PHP", "Language", Loc::Header("x-powered-by"), r"PHP/([\d.]+)", 100),
    rule("PHP", "Language", Loc::Cookie, r"PHPSESSID", 80),
    rule("ASP.NET", "Framework", Loc::Header("x-aspnet-version"), r"([\d.]+)", 100),
    rule("ASP.NET", "Framework", Loc::Header("x-powered-by"), r"ASP\.NET", 95),
    rule("Java", "Language", Loc::Cookie, r"JSESSIONID", 75),
    rule("Django", "Framework", Loc::Cookie, r"csrftoken", 60),
    rule("Ruby on Rails", "Framework", Loc::Cookie, r"_rails_session|_session_id", 65),
    rule("Express", "Framework", Loc::Header("x-powered-by"), r"Express", 95),
    rule("Next.js", "JS Framework", Loc::Header("x-powered-by"), r"Next\.js ?([\d.]+)?", 100),
    rule("Next.js", "JS Framework", Loc::ScriptSrc, r"/_next/static/", 90),
    rule("Nuxt.js", "JS Framework", Loc::Body, r"__NUXT__", 85),
    rule("Angular", "JS Framework", Loc::Body, r#"ng-version="([\d.]+)""#, 95),
    rule("SolidJS", "JS Framework", Loc::Body, r"data-hk=", 50),
    rule("Svelte", "JS Framework", Loc::Body, r#"class=["']svelte-"#, 70),
    rule("Gatsby", "JS Framework", Loc::Body, r#"id=["']___gatsby["']"#, 90),
    rule("Astro", "JS Framework", Loc::MetaTag("generator"), r"Astro v([\d.]+)", 100),
    rule("React", "JS Library", Loc::Body, r"react-dom|data-reactroot|react\.development", 75),
    rule("Vue.js", "JS Library", Loc::Body, r"data-v-app|__VUE_", 75),
    rule("jQuery", "JS Library", Loc::ScriptSrc, r"(?i)jquery[-./]?(?:min|slim)?[-./]?(\d+\.\d+(?:\.\d+)?)?", 90),
    rule("jQuery", "JS Library", Loc::Body, r#"\.fn\.jquery: "([\d.]+)""#, 85),
    rule("Bootstrap", "UI Framework", Loc::LinkHref, r"bootstrap(?:@([\d.]+))?[^\s]*\.css", 80),
    rule("Google Analytics", "Analytics", Loc::ScriptSrc, r"google-analytics\.com/|googletagmanager\.com/", 95),
    baseline("Lodash", r"lodash(?:\.min)?\.js|_\.VERSION", 55),
    baseline("Moment.js", r"moment(?:\.min)?\.js|moment\.version", 55),
    baseline("core-js", r"core-js(?:@([\d.]+))?", 50),
    baseline("Axios", r"axios(?:\.min)?\.js|axios@([\d.]+)", 50),
];

static PARAMETER_NAMES: &[&str] = &[
    "id", "q", "query", "search", "page", "limit", "offset", "sort", "order", "lang", "redirect",
    "redirect_uri", "return", "returnUrl", "next", "url", "callback", "token", "key", "api_key",
    "user", "username", "email", "file", "path", "debug", "format", "category", "ref",
];

struct VulnRule {
    kind: &'static str,
    description: &'static str,
    severity: Severity,
    rule: fn() -> VulnerabilityRule,
}

static VULN_RULES: &[VulnRule] = &[
    VulnRule {
        kind: "Insecure Transport",
        description: "The site is served over plain HTTP, so traffic can be read and modified in transit.",
        severity: Severity::High,
        rule: || VulnerabilityRule::InsecureScheme,
    },
    VulnRule {
        kind: "SQL Error Disclosure",
        description: "The response contains a database error message, a common sign of injectable input.",
        severity: Severity::High,
        rule: || VulnerabilityRule::BodyMatches {
            pattern: r"(?i)you have an error in your sql syntax|unclosed quotation mark|pg_query\(\)|sqlite3?\.OperationalError|ORA-\d{5}".into(),
        },
    },
    VulnRule {
        kind: "Directory Listing",
        description: "Automatic directory indexes expose the file layout of the server.",
        severity: Severity::Medium,
        rule: || VulnerabilityRule::BodyMatches { pattern: r"<title>Index of /".into() },
    },
    VulnRule {
        kind: "Missing HSTS",
        description: "No Strict-Transport-Security header; browsers may be downgraded to HTTP.",
        severity: Severity::Medium,
        rule: || VulnerabilityRule::MissingHeader { header: "strict-transport-security".into() },
    },
    VulnRule {
        kind: "Missing Content-Security-Policy",
        description: "No Content-Security-Policy header to restrict script sources.",
        severity: Severity::Medium,
        rule: || VulnerabilityRule::MissingHeader { header: "content-security-policy".into() },
    },
    VulnRule {
        kind: "Clickjacking",
        description: "No X-Frame-Options header; the page can be framed by other origins.",
        severity: Severity::Medium,
        rule: || VulnerabilityRule::MissingHeader { header: "x-frame-options".into() },
    },
    VulnRule {
        kind: "Cookie Without HttpOnly",
        description: "A cookie is set without HttpOnly and is readable from scripts.",
        severity: Severity::Medium,
        rule: || VulnerabilityRule::CookieMissingFlag { flag: "httponly".into() },
    },
    VulnRule {
        kind: "Cookie Without Secure",
        description: "A cookie is set without the Secure flag and may travel over HTTP.",
        severity: Severity::Low,
        rule: || VulnerabilityRule::CookieMissingFlag { flag: "secure".into() },
    },
    VulnRule {
        kind: "Missing X-Content-Type-Options",
        description: "No X-Content-Type-Options header; browsers may MIME-sniff responses.",
        severity: Severity::Low,
        rule: || VulnerabilityRule::MissingHeader { header: "x-content-type-options".into() },
    },
    VulnRule {
        kind: "Server Version Disclosure",
        description: "The Server header reveals a software version.",
        severity: Severity::Low,
        rule: || VulnerabilityRule::HeaderMatches { header: "server".into(), pattern: r"/\d+(?:\.\d+)+".into() },
    },
    VulnRule {
        kind: "Technology Disclosure",
        description: "The X-Powered-By header reveals the application stack.",
        severity: Severity::Info,
        rule: || VulnerabilityRule::HeaderMatches { header: "x-powered-by".into(), pattern: r".+".into() },
    },
];

/// Builds the catalog shipped with the engine from the static tables above.
pub fn builtin_catalog() -> SignatureCatalog {
    let technologies = TECH_RULES
        .iter()
        .map(|r| TechnologySignature {
            name: r.name.to_string(),
            category: r.category.to_string(),
            location: match r.location {
                Loc::Header(name) => MatchLocation::Header { name: name.to_string() },
                Loc::MetaTag(name) => MatchLocation::MetaTag { name: name.to_string() },
                Loc::Body => MatchLocation::Body,
                Loc::ScriptSrc => MatchLocation::ScriptSrc,
                Loc::LinkHref => MatchLocation::LinkHref,
                Loc::Cookie => MatchLocation::Cookie,
            },
            pattern: r.pattern.to_string(),
            confidence: r.confidence,
            on_demand: r.on_demand,
        })
        .collect();

    let vulnerabilities = VULN_RULES
        .iter()
        .map(|v| VulnerabilitySignature {
            kind: v.kind.to_string(),
            description: v.description.to_string(),
            severity: v.severity,
            rule: (v.rule)(),
        })
        .collect();

    SignatureCatalog {
        technologies,
        coverage: vec![CoverageRule {
            when_category: "JS Framework".to_string(),
            ensure_category: "JS Library".to_string(),
        }],
        parameters: PARAMETER_NAMES.iter().map(|p| p.to_string()).collect(),
        vulnerabilities,
    }
}
