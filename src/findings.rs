//! Audit findings and the final result

use crate::catalog::{CvssScore, SecurityReference};
use crate::probes::Risk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Verdict on a response header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderStatus {
    Secure,
    Info,
    Warning,
    Vulnerable,
}

impl std::fmt::Display for HeaderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secure => write!(f, "Secure"),
            Self::Info => write!(f, "Info"),
            Self::Warning => write!(f, "Warning"),
            Self::Vulnerable => write!(f, "Vulnerable"),
        }
    }
}

/// A response header check
#[derive(Debug, Clone, Serialize)]
pub struct HeaderFinding {
    pub name: String,
    /// Header value, `None` when absent
    pub value: Option<String>,
    pub status: HeaderStatus,
    pub description: String,
    pub reference: Option<SecurityReference>,
}

/// Whether a sensitive path answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Blocked,
    Accessible,
}

/// A sensitive path check
#[derive(Debug, Clone, Serialize)]
pub struct EndpointFinding {
    pub name: String,
    pub path: String,
    pub url: String,
    pub status: EndpointStatus,
    /// 0 when no relay could reach the path
    pub status_code: u16,
    pub risk: Risk,
    pub description: String,
    pub reference: Option<SecurityReference>,
}

/// Outcome of the user enumeration attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumerationStatus {
    /// At least one username was listed
    Found,
    /// Endpoints answered with an access-denied or rate-limit status
    Protected,
    NotFound,
}

/// A WordPress user as listed by the REST API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

/// User enumeration finding
#[derive(Debug, Clone, Serialize)]
pub struct UserEnumeration {
    pub status: EnumerationStatus,
    pub users: Vec<WpUser>,
    /// Technique that produced the users
    pub method: Option<String>,
    /// Explanation and remediation text
    pub description: String,
    pub reference: Option<SecurityReference>,
}

impl UserEnumeration {
    pub fn found(&self) -> bool {
        self.status == EnumerationStatus::Found
    }
}

/// Was the site recognised as WordPress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Detection {
    Detected {
        /// Subdirectory WordPress lives under, if not the root
        subdirectory: Option<String>,
    },
    NotDetected,
    /// The site refused to show its content
    Blocked { reason: String },
}

impl Detection {
    pub fn is_wordpress(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }
}

/// Facts extracted from the fetched pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteInfo {
    pub version: Option<String>,
    pub theme: Option<String>,
    /// A WordPress generator meta tag is published
    pub generator: bool,
    pub readme_exposed: bool,
    pub waf: Option<String>,
    /// The site was reached over https
    pub tls: bool,
}

/// Complete audit of one site
#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    /// Normalized target URL
    pub url: String,
    /// URL WordPress was found under (differs from `url` for subdirectory installs)
    pub base_url: String,
    pub timestamp: DateTime<Utc>,
    pub detection: Detection,
    pub headers: Vec<HeaderFinding>,
    pub endpoints: Vec<EndpointFinding>,
    pub user_enumeration: UserEnumeration,
    pub site: SiteInfo,
    /// 0-100, higher is better
    pub overall_score: u8,
    /// Aggregate CVSS-like severity of everything found
    pub severity: CvssScore,
}

impl AuditResult {
    pub fn is_wordpress(&self) -> bool {
        self.detection.is_wordpress()
    }

    /// Host part of the audited URL
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()?
            .host_str()
            .map(ToString::to_string)
    }

    /// Accessible endpoints, worst risk first
    pub fn exposed_endpoints(&self) -> Vec<&EndpointFinding> {
        let mut exposed: Vec<_> = self
            .endpoints
            .iter()
            .filter(|e| e.status == EndpointStatus::Accessible)
            .collect();
        exposed.sort_by(|a, b| b.risk.cmp(&a.risk));
        exposed
    }
}

/// Progress report emitted while an audit runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditProgress {
    pub step: String,
    pub current: u8,
    pub total: u8,
    pub percentage: u8,
}

impl AuditProgress {
    pub fn new(step: impl Into<String>, current: u8, total: u8) -> Self {
        let current = current.min(total);
        let percentage = if total == 0 {
            100
        } else {
            (f64::from(current) / f64::from(total) * 100.0).round() as u8
        };
        Self {
            step: step.into(),
            current,
            total,
            percentage,
        }
    }
}
