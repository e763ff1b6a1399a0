//! Remediation advice derived from an audit result

use crate::findings::{AuditResult, EndpointStatus, EnumerationStatus, HeaderStatus};
use crate::probes::{Risk, is_critical_header};
use serde::Serialize;

/// How urgently a recommendation should be acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "Critical"),
            Self::Warning => write!(f, "Warning"),
            Self::Info => write!(f, "Info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub level: Level,
    pub title: String,
    pub description: String,
}

impl Recommendation {
    fn new(level: Level, title: &str, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            description: description.into(),
        }
    }
}

/// Critical endpoint name, title and fix
const ENDPOINT_FIXES: &[(&str, &str, &str)] = &[
    (
        "XML-RPC",
        "Disable XML-RPC",
        "XML-RPC is enabled and can be abused for brute-force amplification. Block it in \
         .htaccess with <Files xmlrpc.php> Require all denied </Files> or a security plugin.",
    ),
    (
        "Debug Log",
        "Remove debug.log",
        "wp-content/debug.log is publicly readable and leaks paths and queries. Delete it and \
         set WP_DEBUG_LOG to false in production.",
    ),
    (
        "Git Exposed",
        "Hide the .git directory",
        "The Git repository is downloadable, exposing source code and possibly credentials. \
         Deny access to /.git/ in the web server configuration.",
    ),
    (
        "Config Backup",
        "Delete wp-config backups",
        "A wp-config.php backup is served as plain text with database credentials. Remove it \
         and rotate the credentials.",
    ),
    (
        "Config Temp",
        "Delete wp-config editor copies",
        "An editor temp copy of wp-config.php is served as plain text. Remove it and rotate the \
         database credentials.",
    ),
    (
        "SQL Backup",
        "Remove database dumps",
        "backup.sql is downloadable. Move dumps outside the web root.",
    ),
    (
        "DB Backup",
        "Remove database dumps",
        "database.sql is downloadable. Move dumps outside the web root.",
    ),
    (
        "Env File",
        "Protect the .env file",
        "The .env file with application secrets is downloadable. Deny access to dotfiles and \
         rotate every secret it contains.",
    ),
    (
        "Install Script",
        "Block the installer",
        "wp-admin/install.php is reachable. Restrict access to it at the web server.",
    ),
];

/// Recommendations for a finished audit, most urgent first
///
/// Always returns at least one item.
pub fn recommendations(result: &AuditResult) -> Vec<Recommendation> {
    let mut items = Vec::new();

    let accessible_critical: Vec<&str> = result
        .endpoints
        .iter()
        .filter(|e| e.status == EndpointStatus::Accessible && e.risk == Risk::Critical)
        .map(|e| e.name.as_str())
        .collect();

    for (name, title, description) in ENDPOINT_FIXES {
        let duplicate = items.iter().any(|r: &Recommendation| r.title == *title);
        if accessible_critical.contains(name) && !duplicate {
            items.push(Recommendation::new(Level::Critical, title, *description));
        }
    }

    let missing: Vec<&str> = result
        .headers
        .iter()
        .filter(|h| h.status == HeaderStatus::Vulnerable && is_critical_header(&h.name))
        .map(|h| h.name.as_str())
        .collect();
    if !missing.is_empty() {
        items.push(Recommendation::new(
            Level::Warning,
            "Configure security headers",
            format!(
                "Critical headers are missing: {}. Set them in the web server configuration or \
                 with a security plugin.",
                missing.join(", ")
            ),
        ));
    }

    let enumeration = &result.user_enumeration;
    if enumeration.found() {
        items.push(Recommendation::new(
            Level::Warning,
            "Block user enumeration",
            format!(
                "{} user(s) exposed via {}. Restrict the REST users endpoint to logged-in users \
                 and redirect author archives.",
                enumeration.users.len(),
                enumeration.method.as_deref().unwrap_or("public endpoints")
            ),
        ));
    }

    if result.site.generator {
        items.push(Recommendation::new(
            Level::Info,
            "Hide the WordPress version",
            "The version is published in a generator meta tag. Add \
             remove_action('wp_head', 'wp_generator') to functions.php.",
        ));
    }

    if items.is_empty() {
        items.push(Recommendation::new(
            Level::Info,
            "No critical issues",
            "No critical problems were found. Keep WordPress, themes and plugins up to date.",
        ));
    }

    if enumeration.status == EnumerationStatus::Protected {
        items.push(Recommendation::new(
            Level::Info,
            "User enumeration is blocked",
            "User endpoints refused automated requests. Keep the protection in place.",
        ));
    }

    items
}
