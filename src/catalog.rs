//! Reference catalog
//!
//! Maps every finding the audit can produce to an OWASP Top 10 category, a
//! CWE identifier and a CVSS 3.1 base score, and fingerprints common WAFs
//! from response headers.

use crate::findings::{EndpointFinding, EndpointStatus, HeaderFinding, HeaderStatus};
use crate::relay::Headers;
use serde::Serialize;

/// Qualitative CVSS severity band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Band a 0.0-10.0 score: 0 is None, then Low below 4.0, Medium below
    /// 7.0, High below 9.0, Critical from 9.0 up
    pub const fn from_score(score: f64) -> Self {
        if score.is_nan() || score <= 0.0 {
            Self::None
        } else if score < 4.0 {
            Self::Low
        } else if score < 7.0 {
            Self::Medium
        } else if score < 9.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CVSS score with its band and vector (or summary) string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvssScore {
    pub score: f64,
    pub severity: Severity,
    pub vector: String,
}

/// Standardized classification of a finding
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SecurityReference {
    /// OWASP Top 10 2021 category
    pub owasp: &'static str,
    pub cwe: &'static str,
    /// CVSS 3.1 base score
    pub score: f64,
    pub severity: Severity,
    pub vector: &'static str,
}

impl SecurityReference {
    const fn new(owasp: &'static str, cwe: &'static str, score: f64, vector: &'static str) -> Self {
        Self {
            owasp,
            cwe,
            score,
            severity: Severity::from_score(score),
            vector,
        }
    }

    pub fn cvss(&self) -> CvssScore {
        CvssScore {
            score: self.score,
            severity: self.severity,
            vector: self.vector.to_string(),
        }
    }
}

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingSubject {
    Header,
    Endpoint,
    UserEnumeration,
    VersionDisclosure,
}

const A01: &str = "A01:2021-Broken Access Control";
const A02: &str = "A02:2021-Cryptographic Failures";
const A03: &str = "A03:2021-Injection";
const A05: &str = "A05:2021-Security Misconfiguration";
const A06: &str = "A06:2021-Vulnerable Components";
const A07: &str = "A07:2021-Auth Failures";
const A09: &str = "A09:2021-Logging Failures";

const UI_INTEGRITY_LOW: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:N/I:L/A:N";
const UI_CONFIDENTIALITY_LOW: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:N/A:N";
const CONFIDENTIALITY_LOW: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N";
const CONFIDENTIALITY_HIGH: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N";
const AVAILABILITY_HIGH: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:H";
const AVAILABILITY_LOW: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:L";
const FULL_COMPROMISE: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H";
const NO_IMPACT: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N";

/// Usernames exposed to anonymous visitors
pub const USER_ENUMERATION_REFERENCE: SecurityReference =
    SecurityReference::new(A01, "CWE-200", 5.3, CONFIDENTIALITY_LOW);

/// WordPress version published in a generator tag
pub const VERSION_DISCLOSURE_REFERENCE: SecurityReference =
    SecurityReference::new(A05, "CWE-200", 2.0, CONFIDENTIALITY_LOW);

/// Reference for a missing or weak response header
pub fn header_reference(name: &str) -> Option<SecurityReference> {
    let reference = match name.to_ascii_lowercase().as_str() {
        "content-security-policy" => SecurityReference::new(A05, "CWE-693", 4.3, UI_INTEGRITY_LOW),
        "x-frame-options" => SecurityReference::new(A05, "CWE-693", 4.3, UI_INTEGRITY_LOW),
        "x-content-type-options" => {
            SecurityReference::new(A05, "CWE-693", 3.1, UI_CONFIDENTIALITY_LOW)
        }
        "strict-transport-security" => {
            SecurityReference::new(A02, "CWE-319", 5.3, CONFIDENTIALITY_LOW)
        }
        "x-xss-protection" => SecurityReference::new(A03, "CWE-693", 2.1, UI_INTEGRITY_LOW),
        "referrer-policy" => SecurityReference::new(A05, "CWE-200", 3.1, UI_CONFIDENTIALITY_LOW),
        "permissions-policy" => SecurityReference::new(A05, "CWE-693", 2.1, UI_INTEGRITY_LOW),
        "cross-origin-embedder-policy" | "cross-origin-opener-policy" => {
            SecurityReference::new(A05, "CWE-942", 3.1, UI_CONFIDENTIALITY_LOW)
        }
        "server" | "x-powered-by" => {
            SecurityReference::new(A05, "CWE-200", 2.0, CONFIDENTIALITY_LOW)
        }
        _ => return None,
    };
    Some(reference)
}

/// Reference for a reachable sensitive path
pub fn endpoint_reference(path: &str) -> Option<SecurityReference> {
    let reference = match path {
        "/xmlrpc.php" => SecurityReference::new(A01, "CWE-749", 7.5, AVAILABILITY_HIGH),
        "/wp-login.php" => SecurityReference::new(A07, "CWE-522", 5.3, CONFIDENTIALITY_LOW),
        "/wp-admin/" => SecurityReference::new(A01, "CWE-284", 5.3, CONFIDENTIALITY_LOW),
        "/wp-json/" => SecurityReference::new(A01, "CWE-284", 0.0, NO_IMPACT),
        "/wp-content/debug.log" => {
            SecurityReference::new(A09, "CWE-532", 7.5, CONFIDENTIALITY_HIGH)
        }
        "/.git/" => SecurityReference::new(A05, "CWE-527", 7.5, CONFIDENTIALITY_HIGH),
        "/wp-config.php.bak" | "/wp-config.php~" | "/backup.sql" | "/database.sql" | "/.env" => {
            SecurityReference::new(A05, "CWE-200", 9.8, FULL_COMPROMISE)
        }
        "/wp-admin/install.php" => SecurityReference::new(A05, "CWE-749", 9.8, FULL_COMPROMISE),
        "/readme.html" => SecurityReference::new(A05, "CWE-200", 2.0, CONFIDENTIALITY_LOW),
        "/wp-includes/" => SecurityReference::new(A05, "CWE-200", 0.0, NO_IMPACT),
        "/wp-content/uploads/" => SecurityReference::new(A01, "CWE-200", 3.1, CONFIDENTIALITY_LOW),
        "/wp-cron.php" => SecurityReference::new(A05, "CWE-749", 5.3, AVAILABILITY_LOW),
        "/.htaccess" | "/phpinfo.php" => {
            SecurityReference::new(A05, "CWE-200", 5.3, CONFIDENTIALITY_LOW)
        }
        "/wp-content/plugins/" => SecurityReference::new(A06, "CWE-200", 3.1, CONFIDENTIALITY_LOW),
        _ => return None,
    };
    Some(reference)
}

/// Look up the reference for a finding
///
/// Headers are named by header name, endpoints by path; the two singleton
/// subjects ignore `name`.
pub fn reference(subject: FindingSubject, name: &str) -> Option<SecurityReference> {
    match subject {
        FindingSubject::Header => header_reference(name),
        FindingSubject::Endpoint => endpoint_reference(name),
        FindingSubject::UserEnumeration => Some(USER_ENUMERATION_REFERENCE),
        FindingSubject::VersionDisclosure => Some(VERSION_DISCLOSURE_REFERENCE),
    }
}

/// A WAF and the header substrings that give it away
#[derive(Debug, Clone, Copy)]
pub struct WafSignature {
    pub name: &'static str,
    pub markers: &'static [&'static str],
}

/// Checked in order; the first match wins
pub const WAF_SIGNATURES: &[WafSignature] = &[
    WafSignature {
        name: "Cloudflare",
        markers: &["cloudflare", "cf-ray", "__cfduid"],
    },
    WafSignature {
        name: "Sucuri",
        markers: &["sucuri", "x-sucuri"],
    },
    WafSignature {
        name: "Wordfence",
        markers: &["wordfence", "wfwaf"],
    },
    WafSignature {
        name: "ModSecurity",
        markers: &["mod_security", "modsecurity"],
    },
    WafSignature {
        name: "Imperva",
        markers: &["imperva", "incapsula"],
    },
    WafSignature {
        name: "AWS WAF",
        markers: &["awswaf", "x-amz-cf"],
    },
    WafSignature {
        name: "Akamai",
        markers: &["akamai", "akamai-"],
    },
    WafSignature {
        name: "F5 BIG-IP",
        markers: &["bigip", "f5-"],
    },
];

/// Name of the first WAF whose marker appears in any header name or value
pub fn detect_waf(headers: &Headers) -> Option<&'static str> {
    let haystack = headers
        .iter()
        .map(|(name, value)| format!("{}:{}", name.to_lowercase(), value.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ");

    WAF_SIGNATURES
        .iter()
        .find(|waf| waf.markers.iter().any(|m| haystack.contains(m)))
        .map(|waf| waf.name)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Combine the scores of everything that was actually found
///
/// Vulnerable headers, accessible endpoints, user enumeration and version
/// disclosure contribute their reference score. The result is
/// `max * 0.6 + mean * 0.4`, rounded to one decimal.
pub fn aggregate_severity(
    headers: &[HeaderFinding],
    endpoints: &[EndpointFinding],
    user_enum_found: bool,
    version_disclosed: bool,
) -> CvssScore {
    let mut scores: Vec<f64> = headers
        .iter()
        .filter(|h| h.status == HeaderStatus::Vulnerable)
        .filter_map(|h| h.reference.map(|r| r.score))
        .chain(
            endpoints
                .iter()
                .filter(|e| e.status == EndpointStatus::Accessible)
                .filter_map(|e| e.reference.map(|r| r.score)),
        )
        .collect();

    if user_enum_found {
        scores.push(USER_ENUMERATION_REFERENCE.score);
    }
    if version_disclosed {
        scores.push(VERSION_DISCLOSURE_REFERENCE.score);
    }

    let max = scores.iter().copied().fold(0.0_f64, f64::max);
    let avg = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let score = round1(max * 0.6 + avg * 0.4);

    CvssScore {
        score,
        severity: Severity::from_score(score),
        vector: format!("Max: {}, Issues: {}", max, scores.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::Risk;

    fn endpoint(path: &str, status: EndpointStatus) -> EndpointFinding {
        EndpointFinding {
            name: path.to_string(),
            path: path.to_string(),
            url: format!("https://example.com{}", path),
            status,
            status_code: 200,
            risk: Risk::Critical,
            description: String::new(),
            reference: endpoint_reference(path),
        }
    }

    fn header(name: &str, status: HeaderStatus) -> HeaderFinding {
        HeaderFinding {
            name: name.to_string(),
            value: None,
            status,
            description: String::new(),
            reference: header_reference(name),
        }
    }

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_score(0.0), Severity::None);
        assert_eq!(Severity::from_score(0.1), Severity::Low);
        assert_eq!(Severity::from_score(3.9), Severity::Low);
        assert_eq!(Severity::from_score(4.0), Severity::Medium);
        assert_eq!(Severity::from_score(6.9), Severity::Medium);
        assert_eq!(Severity::from_score(7.0), Severity::High);
        assert_eq!(Severity::from_score(8.9), Severity::High);
        assert_eq!(Severity::from_score(9.0), Severity::Critical);
        assert_eq!(Severity::from_score(10.0), Severity::Critical);
    }

    #[test]
    fn severity_band_is_total_over_range() {
        for tenth in 0..=100 {
            let score = f64::from(tenth) / 10.0;
            let band = Severity::from_score(score);
            assert_eq!(band, Severity::from_score(score));
            assert_eq!(band == Severity::None, tenth == 0);
        }
    }

    #[test]
    fn nan_and_negative_scores_have_no_severity() {
        assert_eq!(Severity::from_score(f64::NAN), Severity::None);
        assert_eq!(Severity::from_score(-1.0), Severity::None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::None);
    }

    #[test]
    fn references_by_subject() {
        let csp = reference(FindingSubject::Header, "content-security-policy").unwrap();
        assert_eq!(csp.cwe, "CWE-693");
        assert_eq!(csp.severity, Severity::Medium);

        let env = reference(FindingSubject::Endpoint, "/.env").unwrap();
        assert_eq!(env.score, 9.8);
        assert_eq!(env.severity, Severity::Critical);

        assert_eq!(
            reference(FindingSubject::UserEnumeration, ""),
            Some(USER_ENUMERATION_REFERENCE)
        );
        assert!(reference(FindingSubject::Endpoint, "/nope").is_none());
    }

    #[test]
    fn detects_cloudflare_from_cf_ray() {
        let headers: Headers = [("CF-RAY", "8a1b2c3d4e-AMS"), ("Server", "cloudflare")]
            .into_iter()
            .collect();
        assert_eq!(detect_waf(&headers), Some("Cloudflare"));
    }

    #[test]
    fn waf_ties_follow_declaration_order() {
        let headers: Headers = [("X-Sucuri-ID", "1"), ("Server", "cloudflare")]
            .into_iter()
            .collect();
        assert_eq!(detect_waf(&headers), Some("Cloudflare"));
    }

    #[test]
    fn no_waf_on_plain_headers() {
        let headers: Headers = [("Server", "nginx"), ("Content-Type", "text/html")]
            .into_iter()
            .collect();
        assert_eq!(detect_waf(&headers), None);
    }

    #[test]
    fn aggregate_of_nothing_is_none() {
        let score = aggregate_severity(&[], &[], false, false);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.severity, Severity::None);
    }

    #[test]
    fn aggregate_of_git_and_xmlrpc_is_high() {
        let endpoints = vec![
            endpoint("/.git/", EndpointStatus::Accessible),
            endpoint("/xmlrpc.php", EndpointStatus::Accessible),
            endpoint("/.env", EndpointStatus::Blocked),
        ];
        let score = aggregate_severity(&[], &endpoints, false, false);
        assert_eq!(score.score, 7.5);
        assert_eq!(score.severity, Severity::High);
        assert_eq!(score.vector, "Max: 7.5, Issues: 2");
    }

    #[test]
    fn aggregate_weights_max_over_mean() {
        let headers = vec![
            header("Content-Security-Policy", HeaderStatus::Vulnerable),
            header("X-Frame-Options", HeaderStatus::Warning),
        ];
        // scores: 4.3 (csp), 5.3 (users), 2.0 (version)
        let score = aggregate_severity(&headers, &[], true, true);
        let expected = ((5.3 * 0.6 + (4.3 + 5.3 + 2.0) / 3.0 * 0.4) * 10.0_f64).round() / 10.0;
        assert_eq!(score.score, expected);
        assert_eq!(score.severity, Severity::Medium);
    }

    #[test]
    fn aggregate_is_pure() {
        let endpoints = vec![endpoint("/wp-config.php.bak", EndpointStatus::Accessible)];
        let first = aggregate_severity(&[], &endpoints, true, false);
        let second = aggregate_severity(&[], &endpoints, true, false);
        assert_eq!(first, second);
    }
}
