//! Pure analysis of fetched pages and headers
//!
//! Nothing here touches the network: every function grades or extracts from
//! data the audit engine already fetched.

use crate::catalog::{FindingSubject, reference};
use crate::findings::{EndpointFinding, EndpointStatus, HeaderFinding, HeaderStatus, SiteInfo, WpUser};
use crate::probes::{DISCLOSURE_HEADERS, SECURITY_HEADERS};
use crate::relay::Headers;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// HSTS max-age considered long enough (one year)
pub const HSTS_MIN_MAX_AGE: u64 = 31_536_000;

/// Tokens that weaken a Content-Security-Policy
const CSP_UNSAFE_TOKENS: &[&str] = &["unsafe-inline", "unsafe-eval"];

fn hsts_max_age(value: &str) -> u64 {
    let Ok(re) = Regex::new(r#"max-age\s*=\s*"?(\d+)"#) else {
        return 0;
    };
    re.captures(value)
        .and_then(|caps| caps.get(1))
        // all digits, so a parse failure can only be overflow
        .map(|m| m.as_str().parse().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Grade a security header value; `None` or blank means absent
pub fn header_status(name: &str, value: Option<&str>) -> HeaderStatus {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return HeaderStatus::Vulnerable;
    };
    let lower = value.to_lowercase();

    match name.to_ascii_lowercase().as_str() {
        "content-security-policy" => {
            if CSP_UNSAFE_TOKENS.iter().any(|t| lower.contains(t)) {
                HeaderStatus::Warning
            } else {
                HeaderStatus::Secure
            }
        }
        "x-frame-options" => match lower.as_str() {
            "deny" | "sameorigin" => HeaderStatus::Secure,
            _ => HeaderStatus::Warning,
        },
        "strict-transport-security" => match hsts_max_age(&lower) {
            age if age >= HSTS_MIN_MAX_AGE => HeaderStatus::Secure,
            0 => HeaderStatus::Vulnerable,
            _ => HeaderStatus::Warning,
        },
        "x-content-type-options" => {
            if lower == "nosniff" {
                HeaderStatus::Secure
            } else {
                HeaderStatus::Warning
            }
        }
        _ => HeaderStatus::Secure,
    }
}

fn header_description(name: &str, status: HeaderStatus) -> String {
    if status == HeaderStatus::Vulnerable {
        return format!(
            "{} is missing or ineffective, leaving the site without this browser protection.",
            name
        );
    }

    let purpose = match name.to_ascii_lowercase().as_str() {
        "content-security-policy" => "Restricts which resources the page may load.",
        "x-frame-options" => "Protects against clickjacking.",
        "strict-transport-security" => "Forces browsers to use HTTPS.",
        "x-content-type-options" => "Prevents MIME-type sniffing.",
        "x-xss-protection" => "Legacy browser XSS filter.",
        "referrer-policy" => "Controls how much referrer information is sent.",
        "permissions-policy" => "Controls which browser APIs the page may use.",
        "cross-origin-embedder-policy" => "Controls cross-origin resource embedding.",
        "cross-origin-opener-policy" => "Isolates the browsing context from cross-origin windows.",
        _ => "Security header.",
    };

    if status == HeaderStatus::Warning {
        format!("{} Present, but the value is weak.", purpose)
    } else {
        purpose.to_string()
    }
}

/// Grade every security header and flag stack-disclosing ones
///
/// Findings come out in a fixed order: the graded headers as listed in
/// [`SECURITY_HEADERS`], then any present disclosure header.
pub fn analyze_headers(headers: &Headers) -> Vec<HeaderFinding> {
    let mut findings: Vec<HeaderFinding> = SECURITY_HEADERS
        .iter()
        .map(|probe| {
            let value = headers.get(probe.name);
            let status = header_status(probe.name, value);
            HeaderFinding {
                name: probe.name.to_string(),
                value: value.map(ToString::to_string),
                status,
                description: header_description(probe.name, status),
                reference: reference(FindingSubject::Header, probe.name),
            }
        })
        .collect();

    for name in DISCLOSURE_HEADERS {
        if let Some(value) = headers.get(name) {
            findings.push(HeaderFinding {
                name: name.to_string(),
                value: Some(value.to_string()),
                status: HeaderStatus::Warning,
                description: format!("{} reveals the server stack and should be removed.", name),
                reference: reference(FindingSubject::Header, name),
            });
        }
    }

    findings
}

/// Extract `(generator published, version)` from the generator meta tag
fn version_from_meta(document: &Html) -> (bool, Option<String>) {
    let Ok(selector) = Selector::parse("meta[name]") else {
        return (false, None);
    };

    for element in document.select(&selector) {
        let is_generator = element
            .value()
            .attr("name")
            .is_some_and(|name| name.eq_ignore_ascii_case("generator"));
        if is_generator
            && let Some(content) = element.value().attr("content")
            && content
                .get(..9)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("wordpress"))
        {
            let version = content[9..].trim();
            let version = version
                .starts_with(|c: char| c.is_ascii_digit())
                .then(|| version.to_string());
            return (true, version);
        }
    }
    (false, None)
}

/// Core version from a versioned core stylesheet or script
fn version_from_assets(html: &str) -> Option<String> {
    let re = Regex::new(
        r#"/wp-includes/(?:css/|js/wp-emoji|js/dist/)[^"'\s>]*\?ver=(\d+\.\d+(?:\.\d+)?)"#,
    )
    .ok()?;
    re.captures(html)?.get(1).map(|m| m.as_str().to_string())
}

fn theme_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r#"wp-content/themes/([^/"'?#\s]+)"#).ok()?;
    re.captures(url)?.get(1).map(|m| m.as_str().to_string())
}

fn theme_from_document(document: &Html, html: &str) -> Option<String> {
    // Stylesheet links first, then any theme path in the markup
    if let Ok(selector) = Selector::parse("link[rel='stylesheet']") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href")
                && let Some(slug) = theme_from_url(href)
            {
                return Some(slug);
            }
        }
    }
    theme_from_url(html)
}

/// Collect version, theme and related facts from an already-fetched page
pub fn extract_site_info(
    html: &str,
    site_url: &str,
    waf: Option<&str>,
    endpoints: &[EndpointFinding],
) -> SiteInfo {
    let document = Html::parse_document(html);
    let (generator, meta_version) = version_from_meta(&document);
    let version = meta_version.or_else(|| version_from_assets(html));
    let theme = theme_from_document(&document, html);

    let readme_exposed = endpoints
        .iter()
        .any(|e| e.path == "/readme.html" && e.status == EndpointStatus::Accessible);

    SiteInfo {
        version,
        theme,
        generator,
        readme_exposed,
        waf: waf.map(ToString::to_string),
        tls: Url::parse(site_url).is_ok_and(|u| u.scheme() == "https"),
    }
}

/// Parse a REST users listing, keeping at most `max` users
///
/// Returns `None` when the body is not a JSON array of users.
pub fn parse_users(body: &str, max: usize) -> Option<Vec<WpUser>> {
    let mut users: Vec<WpUser> = serde_json::from_str(body.trim()).ok()?;
    users.truncate(max);
    Some(users)
}

/// Author slug from an author archive page or redirect target
pub fn extract_author_slug(body: &str) -> Option<String> {
    let re = Regex::new(r#"/author/([^/"'?#\s<>]+)"#).ok()?;
    re.captures(body)?.get(1).map(|m| m.as_str().to_string())
}
