//! Audit engine
//!
//! Audits one site in a fixed sequence: connect, detect WordPress (falling
//! back to common subdirectories), then check headers, sensitive endpoints
//! and user enumeration concurrently, and finally extract site details and
//! score everything.

use crate::analyze::{analyze_headers, extract_author_slug, extract_site_info, parse_users};
use crate::catalog::{USER_ENUMERATION_REFERENCE, aggregate_severity, detect_waf, endpoint_reference};
use crate::error::{Error, Result};
use crate::findings::{
    AuditProgress, AuditResult, Detection, EndpointFinding, EndpointStatus, EnumerationStatus,
    UserEnumeration, WpUser,
};
use crate::probes::{
    BLOCK_STATUSES, SENSITIVE_ENDPOINTS, SUBDIRECTORY_CANDIDATES, USER_ENUMERATION_SUBDIRECTORIES,
    looks_like_challenge, match_signatures,
};
use crate::relay::{
    DEFAULT_PROBE_CONCURRENCY, Fetcher, ProbeOutcome, RelayResponse, RelayTransport,
    probe_many_exist,
};
use crate::scoring::overall_score;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

/// Allowed URL schemes
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Number of progress steps reported per audit
pub const TOTAL_STEPS: u8 = 4;

/// Most users kept from any enumeration method
pub const MAX_USERS: usize = 10;

/// `?author=N` pages tried as a last resort
pub const AUTHOR_PROBES: u64 = 3;

/// REST user listings, in the order they are tried
const USER_ROUTES: &[(&str, &str)] = &[
    // Works even when pretty permalinks or /wp-json/ are blocked
    ("/?rest_route=/wp/v2/users", "REST route"),
    ("/wp-json/wp/v2/users", "REST API"),
];

/// Normalize user input into an absolute http(s) URL without trailing slash
///
/// A missing scheme defaults to https.
pub fn normalize_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let with_scheme = if !trimmed.contains("://") {
        format!("https://{}", trimmed)
    } else {
        trimmed.to_string()
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(Error::InvalidUrl(format!(
            "scheme '{}' not allowed (use http or https)",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl("missing host".to_string()));
    }

    // Serialized form has a lowercase scheme and host
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Tunables for the audit engine
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Existence probes in flight at once
    pub probe_concurrency: usize,
    pub max_users: usize,
    pub author_probes: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            max_users: MAX_USERS,
            author_probes: AUTHOR_PROBES,
        }
    }
}

/// Answer from one REST users listing
enum UserQuery {
    Users(Vec<WpUser>),
    Empty,
    Blocked,
    Unavailable,
}

/// Where WordPress was found
struct SiteLocation {
    detection: Detection,
    base_url: String,
    /// Page fetched from a matching subdirectory
    page: Option<RelayResponse>,
}

fn is_blocking_error(err: &Error) -> bool {
    err.relay_statuses()
        .iter()
        .any(|status| BLOCK_STATUSES.contains(status))
}

/// Detected base first, then the site root and common install directories
fn enumeration_bases(site_url: &str, base_url: &str) -> Vec<String> {
    let mut bases = vec![base_url.to_string()];
    let candidates = std::iter::once(site_url.to_string()).chain(
        USER_ENUMERATION_SUBDIRECTORIES
            .iter()
            .map(|dir| format!("{}{}", site_url, dir)),
    );
    for candidate in candidates {
        if !bases.contains(&candidate) {
            bases.push(candidate);
        }
    }
    bases
}

fn users_found(users: Vec<WpUser>, method: String) -> UserEnumeration {
    UserEnumeration {
        description: format!(
            "{} username(s) are publicly listed via {}. Attackers can use them for targeted \
             brute-force attacks; restrict the users endpoint to authenticated requests and \
             disable author archives.",
            users.len(),
            method
        ),
        status: EnumerationStatus::Found,
        users,
        method: Some(method),
        reference: Some(USER_ENUMERATION_REFERENCE),
    }
}

fn users_protected() -> UserEnumeration {
    UserEnumeration {
        status: EnumerationStatus::Protected,
        users: Vec::new(),
        method: None,
        description: "User endpoints answered with an access-denied or rate-limit status. \
                      A security layer appears to block user enumeration; keep it enabled."
            .to_string(),
        reference: None,
    }
}

fn users_not_found() -> UserEnumeration {
    UserEnumeration {
        status: EnumerationStatus::NotFound,
        users: Vec::new(),
        method: None,
        description: "No usernames could be enumerated through the REST API or author archives."
            .to_string(),
        reference: None,
    }
}

/// WordPress security auditor
///
/// Generic over the [`Fetcher`] so tests can substitute scripted transports.
#[derive(Debug)]
pub struct Auditor<F = RelayTransport> {
    fetcher: F,
    config: AuditConfig,
}

impl Auditor<RelayTransport> {
    /// Auditor over the built-in public relays
    pub fn with_default_relays() -> Result<Self> {
        Ok(Self::new(RelayTransport::new()?))
    }
}

impl<F: Fetcher> Auditor<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            config: AuditConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Audit a site
    ///
    /// Fails only when the site's root page cannot be fetched at all (or the
    /// URL is invalid); every other problem is recorded in the result.
    pub async fn audit(&self, url: &str) -> Result<AuditResult> {
        self.audit_with_progress(url, |_| {}).await
    }

    /// Audit a site, reporting progress after each step
    pub async fn audit_with_progress<P>(&self, url: &str, mut on_progress: P) -> Result<AuditResult>
    where
        P: FnMut(AuditProgress),
    {
        let site_url = normalize_url(url)?;
        let mut report = |step: &str, current: u8| {
            debug!(step, current, "audit progress");
            on_progress(AuditProgress::new(step, current, TOTAL_STEPS));
        };

        report("Connecting to site", 0);
        let root = self.connect(&site_url).await?;

        report("Detecting WordPress", 1);
        let location = self.locate(&site_url, &root).await;
        info!(url = %site_url, base = %location.base_url, detection = ?location.detection, "detection finished");

        report("Checking headers, endpoints and users", 2);
        let header_check = async { (analyze_headers(&root.headers), detect_waf(&root.headers)) };
        let ((headers, waf), endpoints, user_enumeration) = tokio::join!(
            header_check,
            self.probe_endpoints(&location.base_url),
            self.enumerate_users(&site_url, &location.base_url),
        );

        report("Scoring", 3);
        let html = location
            .page
            .as_ref()
            .map_or(root.body.as_str(), |page| page.body.as_str());
        let site = extract_site_info(html, &site_url, waf, &endpoints);
        let users_exposed = user_enumeration.found();
        let overall = overall_score(&headers, &endpoints, users_exposed, site.generator);
        let severity = aggregate_severity(&headers, &endpoints, users_exposed, site.generator);

        let result = AuditResult {
            url: site_url,
            base_url: location.base_url,
            timestamp: Utc::now(),
            detection: location.detection,
            headers,
            endpoints,
            user_enumeration,
            site,
            overall_score: overall,
            severity,
        };

        info!(url = %result.url, score = result.overall_score, severity = %result.severity.severity, "audit finished");
        report("Audit complete", TOTAL_STEPS);
        Ok(result)
    }

    async fn connect(&self, site_url: &str) -> Result<RelayResponse> {
        self.fetcher.fetch(site_url, true).await.map_err(|e| {
            warn!(url = site_url, error = %e, "could not fetch root page");
            Error::ConnectionFailed(format!(
                "could not connect to {}: the relay services may be unavailable or blocked by the site ({})",
                site_url, e
            ))
        })
    }

    /// Detect WordPress on the root page, then in common subdirectories
    async fn locate(&self, site_url: &str, root: &RelayResponse) -> SiteLocation {
        if match_signatures(&root.body).is_wordpress() {
            return SiteLocation {
                detection: Detection::Detected { subdirectory: None },
                base_url: site_url.to_string(),
                page: None,
            };
        }

        for dir in SUBDIRECTORY_CANDIDATES {
            let candidate = format!("{}{}", site_url, dir);
            match self.fetcher.fetch(&candidate, true).await {
                Ok(page) if match_signatures(&page.body).is_wordpress() => {
                    return SiteLocation {
                        detection: Detection::Detected {
                            subdirectory: Some(dir.to_string()),
                        },
                        base_url: candidate,
                        page: Some(page),
                    };
                }
                Ok(_) => debug!(url = %candidate, "no WordPress signature"),
                Err(e) => debug!(url = %candidate, error = %e, "subdirectory fetch failed"),
            }
        }

        let detection = if root.is_denied() {
            Detection::Blocked {
                reason: format!(
                    "root page answered HTTP {}; a firewall or the relay is refusing automated requests",
                    root.status
                ),
            }
        } else if looks_like_challenge(&root.body) {
            Detection::Blocked {
                reason: "root page is a bot challenge or firewall block page".to_string(),
            }
        } else {
            Detection::NotDetected
        };

        SiteLocation {
            detection,
            base_url: site_url.to_string(),
            page: None,
        }
    }

    async fn probe_endpoints(&self, base_url: &str) -> Vec<EndpointFinding> {
        let urls: Vec<String> = SENSITIVE_ENDPOINTS
            .iter()
            .map(|probe| format!("{}{}", base_url, probe.path))
            .collect();
        let outcomes = probe_many_exist(&self.fetcher, &urls, self.config.probe_concurrency).await;

        SENSITIVE_ENDPOINTS
            .iter()
            .zip(urls)
            .map(|(probe, url)| {
                let outcome = outcomes
                    .get(&url)
                    .copied()
                    .unwrap_or(ProbeOutcome::UNREACHABLE);
                EndpointFinding {
                    name: probe.name.to_string(),
                    path: probe.path.to_string(),
                    status: if outcome.exists {
                        EndpointStatus::Accessible
                    } else {
                        EndpointStatus::Blocked
                    },
                    status_code: outcome.status_code,
                    risk: probe.risk,
                    description: probe.description.to_string(),
                    reference: endpoint_reference(probe.path),
                    url,
                }
            })
            .collect()
    }

    async fn query_users(&self, url: &str) -> UserQuery {
        match self.fetcher.fetch(url, true).await {
            Ok(response) if response.is_denied() => UserQuery::Blocked,
            Ok(response) if response.is_success() => {
                match parse_users(&response.body, self.config.max_users) {
                    Some(users) if !users.is_empty() => UserQuery::Users(users),
                    _ => UserQuery::Empty,
                }
            }
            Ok(_) => UserQuery::Empty,
            Err(e) if is_blocking_error(&e) => UserQuery::Blocked,
            Err(e) => {
                debug!(url, error = %e, "user listing unavailable");
                UserQuery::Unavailable
            }
        }
    }

    /// Try the REST route form, the REST API path, then author archives
    async fn enumerate_users(&self, site_url: &str, base_url: &str) -> UserEnumeration {
        let bases = enumeration_bases(site_url, base_url);
        let mut protected = false;

        for (route, label) in USER_ROUTES {
            for base in &bases {
                let url = format!("{}{}", base, route);
                match self.query_users(&url).await {
                    UserQuery::Users(users) => {
                        let shown = url.strip_prefix(site_url).unwrap_or(&url);
                        return users_found(users, format!("{} ({})", label, shown));
                    }
                    UserQuery::Blocked => protected = true,
                    UserQuery::Empty | UserQuery::Unavailable => {}
                }
            }
        }

        let mut users: Vec<WpUser> = Vec::new();
        for id in 1..=self.config.author_probes {
            let url = format!("{}/?author={}", base_url, id);
            match self.fetcher.fetch(&url, true).await {
                Ok(page) if page.is_denied() => protected = true,
                Ok(page) => {
                    if let Some(slug) = extract_author_slug(&page.body)
                        && !users.iter().any(|u| u.slug == slug)
                    {
                        users.push(WpUser {
                            id,
                            name: slug.clone(),
                            slug,
                        });
                    }
                }
                Err(e) if is_blocking_error(&e) => protected = true,
                Err(e) => debug!(url = %url, error = %e, "author probe failed"),
            }
        }

        if !users.is_empty() {
            users.truncate(self.config.max_users);
            return users_found(users, "Author archives (?author=N)".to_string());
        }

        if protected {
            users_protected()
        } else {
            users_not_found()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Headers;
    use std::collections::HashMap;

    #[test]
    fn adds_https_and_strips_slashes() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(
            normalize_url("  http://example.com/blog///  ").unwrap(),
            "http://example.com/blog"
        );
    }

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(normalize_url("HTTPS://X.Test/").unwrap(), "https://x.test");
        assert_eq!(
            normalize_url("Example.COM/Blog").unwrap(),
            "https://example.com/Blog"
        );
    }

    #[test]
    fn parse_invalid_url() {
        assert!(normalize_url("not a url").is_err());
        assert!(normalize_url("").is_err());
    }

    #[test]
    fn reject_file_scheme() {
        let result = normalize_url("file:///etc/passwd");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("scheme"));
    }

    #[test]
    fn reject_ftp_scheme() {
        let result = normalize_url("ftp://example.com");
        assert!(result.unwrap_err().to_string().contains("scheme"));
    }

    #[test]
    fn enumeration_bases_start_with_detected_base() {
        assert_eq!(
            enumeration_bases("https://x.test", "https://x.test"),
            vec![
                "https://x.test",
                "https://x.test/blog",
                "https://x.test/wordpress",
                "https://x.test/wp",
            ]
        );
        assert_eq!(
            enumeration_bases("https://x.test", "https://x.test/wp")[..2],
            ["https://x.test/wp".to_string(), "https://x.test".to_string()]
        );
    }

    /// Answers from a fixed URL -> (status, body) table
    struct TableFetcher(HashMap<String, (u16, String)>);

    impl Fetcher for TableFetcher {
        async fn fetch(&self, url: &str, _use_cache: bool) -> Result<RelayResponse> {
            match self.0.get(url) {
                Some((status, body)) => Ok(RelayResponse {
                    status: *status,
                    headers: Headers::new(),
                    body: body.clone(),
                }),
                None => Err(Error::RelayExhausted { failures: vec![] }),
            }
        }
    }

    #[test]
    fn finds_wordpress_in_subdirectory() {
        let fetcher = TableFetcher(HashMap::from([
            ("https://x.test".to_string(), (200, "<html>Corporate site</html>".to_string())),
            (
                "https://x.test/wordpress".to_string(),
                (200, r#"<link href="/wordpress/wp-content/themes/astra/style.css">"#.to_string()),
            ),
        ]));
        let auditor = Auditor::new(fetcher);

        let result = tokio_test::block_on(auditor.audit("x.test")).unwrap();
        assert_eq!(
            result.detection,
            Detection::Detected {
                subdirectory: Some("/wordpress".to_string())
            }
        );
        assert_eq!(result.base_url, "https://x.test/wordpress");
        assert_eq!(result.site.theme.as_deref(), Some("astra"));
        assert!(
            result
                .endpoints
                .iter()
                .all(|e| e.url.starts_with("https://x.test/wordpress/"))
        );
    }

    #[test]
    fn denied_root_without_signatures_is_blocked() {
        let fetcher = TableFetcher(HashMap::from([(
            "https://x.test".to_string(),
            (403, "<html>Forbidden</html>".to_string()),
        )]));
        let result = tokio_test::block_on(Auditor::new(fetcher).audit("https://x.test")).unwrap();
        assert!(matches!(result.detection, Detection::Blocked { .. }));
        assert!(!result.is_wordpress());
    }

    #[test]
    fn author_archives_are_last_resort() {
        let fetcher = TableFetcher(HashMap::from([
            ("https://x.test".to_string(), (200, "<html>wp-content</html>".to_string())),
            (
                "https://x.test/?author=1".to_string(),
                (200, r#"<a href="https://x.test/author/alice/">alice</a>"#.to_string()),
            ),
            (
                "https://x.test/?author=2".to_string(),
                (200, r#"<a href="https://x.test/author/bob/">bob</a>"#.to_string()),
            ),
            (
                "https://x.test/?author=3".to_string(),
                (200, r#"<a href="https://x.test/author/bob/">bob</a>"#.to_string()),
            ),
        ]));
        let result = tokio_test::block_on(Auditor::new(fetcher).audit("x.test")).unwrap();
        let enumeration = result.user_enumeration;
        assert!(enumeration.found());
        assert_eq!(enumeration.method.as_deref(), Some("Author archives (?author=N)"));
        let slugs: Vec<_> = enumeration.users.iter().map(|u| u.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alice", "bob"]);
        assert_eq!(enumeration.users[1].id, 2);
    }
}
