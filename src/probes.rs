//! Fixed probe sets: which headers to grade, which paths to request and what
//! a WordPress page looks like.

use regex::Regex;
use serde::Serialize;

/// A security header to grade
#[derive(Debug, Clone, Copy)]
pub struct HeaderProbe {
    pub name: &'static str,
    /// Missing critical headers weigh more in the score
    pub critical: bool,
}

pub const SECURITY_HEADERS: &[HeaderProbe] = &[
    HeaderProbe {
        name: "Content-Security-Policy",
        critical: true,
    },
    HeaderProbe {
        name: "X-Frame-Options",
        critical: true,
    },
    HeaderProbe {
        name: "X-Content-Type-Options",
        critical: true,
    },
    HeaderProbe {
        name: "Strict-Transport-Security",
        critical: true,
    },
    HeaderProbe {
        name: "X-XSS-Protection",
        critical: false,
    },
    HeaderProbe {
        name: "Referrer-Policy",
        critical: false,
    },
    HeaderProbe {
        name: "Permissions-Policy",
        critical: false,
    },
    HeaderProbe {
        name: "Cross-Origin-Embedder-Policy",
        critical: false,
    },
    HeaderProbe {
        name: "Cross-Origin-Opener-Policy",
        critical: false,
    },
];

/// Headers that reveal the server stack when present
pub const DISCLOSURE_HEADERS: &[&str] = &["Server", "X-Powered-By"];

pub fn is_critical_header(name: &str) -> bool {
    SECURITY_HEADERS
        .iter()
        .any(|h| h.critical && h.name.eq_ignore_ascii_case(name))
}

/// Risk tier of a sensitive path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// A path whose reachability matters
#[derive(Debug, Clone, Copy)]
pub struct EndpointProbe {
    pub path: &'static str,
    pub name: &'static str,
    pub risk: Risk,
    pub description: &'static str,
}

const fn endpoint(
    path: &'static str,
    name: &'static str,
    risk: Risk,
    description: &'static str,
) -> EndpointProbe {
    EndpointProbe {
        path,
        name,
        risk,
        description,
    }
}

pub const SENSITIVE_ENDPOINTS: &[EndpointProbe] = &[
    endpoint("/xmlrpc.php", "XML-RPC", Risk::Critical, "XML-RPC allows brute-force amplification and pingback DDoS"),
    endpoint("/wp-login.php", "WP Login", Risk::Medium, "Login page is publicly reachable"),
    endpoint("/wp-admin/", "WP Admin", Risk::Medium, "Administration panel is reachable"),
    endpoint("/wp-json/", "REST API", Risk::Info, "WordPress REST API is enabled"),
    endpoint("/wp-content/debug.log", "Debug Log", Risk::Critical, "Debug log may contain paths, queries and credentials"),
    endpoint("/wp-config.php.bak", "Config Backup", Risk::Critical, "Configuration backup exposes database credentials"),
    endpoint("/wp-config.php~", "Config Temp", Risk::Critical, "Editor temp copy of the configuration file"),
    endpoint("/.git/", "Git Exposed", Risk::Critical, "Git repository exposes source code and history"),
    endpoint("/readme.html", "Readme", Risk::Low, "Readme discloses the WordPress version"),
    endpoint("/wp-includes/", "WP Includes", Risk::Info, "Includes directory is reachable"),
    endpoint("/wp-content/uploads/", "Uploads", Risk::Low, "Uploads directory may be listable"),
    endpoint("/wp-cron.php", "WP Cron", Risk::Medium, "Publicly triggerable cron can be abused for DoS"),
    endpoint("/wp-admin/install.php", "Install Script", Risk::Critical, "Installer is reachable"),
    endpoint("/backup.sql", "SQL Backup", Risk::Critical, "Database dump is downloadable"),
    endpoint("/database.sql", "DB Backup", Risk::Critical, "Database dump is downloadable"),
    endpoint("/.env", "Env File", Risk::Critical, "Environment file with secrets"),
    endpoint("/.htaccess", "htaccess", Risk::High, "Server configuration is readable"),
    endpoint("/phpinfo.php", "PHP Info", Risk::High, "phpinfo() output reveals server configuration"),
    endpoint("/wp-content/plugins/", "Plugins Dir", Risk::Low, "Plugin directory listing is visible"),
];

/// One match is enough to call a page WordPress
pub const STRONG_SIGNATURES: &[&str] = &[
    "wp-content",
    "wp-includes",
    "wp-json",
    "xmlrpc.php",
    "wp-login.php",
    "woocommerce",
];

/// Two matches are needed
pub const WEAK_SIGNATURES: &[&str] = &["WordPress", "/themes/", "/plugins/"];

/// Tried in order when the root page shows no WordPress signature
pub const SUBDIRECTORY_CANDIDATES: &[&str] = &["/blog", "/wordpress", "/wp", "/news"];

/// Extra install locations tried by user enumeration
pub const USER_ENUMERATION_SUBDIRECTORIES: &[&str] = &["/blog", "/wordpress", "/wp"];

/// Statuses that mean a security layer refused the request
pub const BLOCK_STATUSES: &[u16] = &[401, 403, 406, 429];

/// Lowercase substrings of bot-challenge and firewall block pages
pub const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "just a moment...",
    "attention required!",
    "sucuri website firewall",
    "access denied",
];

/// Signature hits on a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureMatch {
    pub strong: usize,
    pub weak: usize,
}

impl SignatureMatch {
    pub fn is_wordpress(&self) -> bool {
        self.strong >= 1 || self.weak >= 2
    }
}

fn has_generator_tag(html: &str) -> bool {
    let Ok(re) = Regex::new(
        r#"(?i)<meta[^>]*(?:name=["']generator["'][^>]*content=["']wordpress|content=["']wordpress[^"']*["'][^>]*name=["']generator["'])"#,
    ) else {
        return false;
    };
    re.is_match(html)
}

/// Count WordPress signatures in a page
pub fn match_signatures(html: &str) -> SignatureMatch {
    let strong = STRONG_SIGNATURES.iter().filter(|s| html.contains(*s)).count()
        + usize::from(has_generator_tag(html));
    let weak = WEAK_SIGNATURES.iter().filter(|s| html.contains(*s)).count();
    SignatureMatch { strong, weak }
}

/// Does the page look like a firewall or bot challenge
pub fn looks_like_challenge(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}
