//! Full audits driven by a scripted fetcher

use std::collections::HashMap;
use std::sync::Mutex;
use wp_relay_audit::{
    AuditProgress, Auditor, Detection, EndpointStatus, EnumerationStatus, Error, Fetcher,
    Headers, RelayFailure, RelayResponse, Result, Severity, recommendations,
};

const SITE: &str = "https://shop.test";

const HOME: &str = r#"<html><head>
<link rel="stylesheet" href="https://shop.test/wp-content/themes/storefront/style.css?ver=4.5" />
</head><body>Welcome</body></html>"#;

/// Answers scripted URLs; anything else fails like a relay relaying a 404
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, RelayResponse>,
    failures: HashMap<String, u16>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            RelayResponse {
                status,
                headers: Headers::new(),
                body: body.to_string(),
            },
        );
        self
    }

    fn with_headers(mut self, url: &str, headers: Headers) -> Self {
        if let Some(page) = self.pages.get_mut(url) {
            page.headers = headers;
        }
        self
    }

    fn failing(mut self, url: &str, status: u16) -> Self {
        self.failures.insert(url.to_string(), status);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

fn relay_error(status: u16) -> Error {
    Error::RelayExhausted {
        failures: vec![RelayFailure {
            relay: "scripted".to_string(),
            reason: format!("HTTP {}", status),
            status: Some(status),
        }],
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _use_cache: bool) -> Result<RelayResponse> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(page) = self.pages.get(url) {
            return Ok(page.clone());
        }
        Err(relay_error(self.failures.get(url).copied().unwrap_or(404)))
    }
}

fn hardened_headers() -> Headers {
    [
        ("Content-Security-Policy", "default-src 'self'"),
        ("X-Frame-Options", "DENY"),
        ("X-Content-Type-Options", "nosniff"),
        ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
        ("X-XSS-Protection", "1; mode=block"),
        ("Referrer-Policy", "strict-origin-when-cross-origin"),
        ("Permissions-Policy", "geolocation=()"),
        ("Cross-Origin-Embedder-Policy", "require-corp"),
        ("Cross-Origin-Opener-Policy", "same-origin"),
    ]
    .into_iter()
    .collect()
}

fn hardened_site() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .page(SITE, 200, HOME)
        .with_headers(SITE, hardened_headers())
}

#[tokio::test]
async fn hardened_site_scores_95() {
    let auditor = Auditor::new(hardened_site());
    let result = auditor.audit("shop.test/").await.unwrap();

    assert_eq!(result.url, SITE);
    assert_eq!(result.detection, Detection::Detected { subdirectory: None });
    assert_eq!(result.headers.len(), 9);
    assert_eq!(result.endpoints.len(), 19);
    assert!(result.endpoints.iter().all(|e| e.status == EndpointStatus::Blocked));
    assert_eq!(result.user_enumeration.status, EnumerationStatus::NotFound);
    assert_eq!(result.site.theme.as_deref(), Some("storefront"));
    assert!(result.site.tls);
    assert_eq!(result.overall_score, 95);
    assert_eq!(result.severity.severity, Severity::None);
    assert_eq!(result.severity.score, 0.0);

    let advice = recommendations(&result);
    assert_eq!(advice.len(), 1);
    assert_eq!(advice[0].title, "No critical issues");
}

#[tokio::test]
async fn exposed_git_and_xmlrpc() {
    let fetcher = hardened_site()
        .page(&format!("{}/.git/", SITE), 200, "Index of /.git")
        .page(
            &format!("{}/xmlrpc.php", SITE),
            200,
            "XML-RPC server accepts POST requests only.",
        );
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    let exposed: Vec<_> = result.exposed_endpoints().iter().map(|e| e.path.clone()).collect();
    assert_eq!(exposed.len(), 2);
    assert!(exposed.contains(&"/.git/".to_string()));
    assert!(exposed.contains(&"/xmlrpc.php".to_string()));

    assert_eq!(result.overall_score, 76);
    assert_eq!(result.severity.score, 7.5);
    assert_eq!(result.severity.severity, Severity::High);

    let titles: Vec<_> = recommendations(&result).into_iter().map(|r| r.title).collect();
    assert_eq!(titles, vec!["Disable XML-RPC", "Hide the .git directory"]);
}

#[tokio::test]
async fn unreachable_site_fails_to_connect() {
    let err = Auditor::new(ScriptedFetcher::default())
        .audit("https://down.test")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConnectionFailed(_)));
    assert!(err.to_string().contains("could not connect to https://down.test"));
    assert!(err.to_string().contains("relay services may be unavailable"));
}

#[tokio::test]
async fn uppercase_scheme_is_normalized_and_keeps_tls() {
    let fetcher = ScriptedFetcher::default().page("https://x.test", 200, HOME);
    let result = Auditor::new(fetcher).audit("HTTPS://x.test/").await.unwrap();

    assert_eq!(result.url, "https://x.test");
    assert!(result.is_wordpress());
    assert!(result.site.tls);
}

#[tokio::test]
async fn invalid_url_is_rejected_before_fetching() {
    let fetcher = ScriptedFetcher::default();
    let auditor = Auditor::new(fetcher);
    let err = auditor.audit("ftp://shop.test").await.unwrap_err();

    assert!(matches!(err, Error::InvalidUrl(_)));
    assert!(auditor.fetcher().requested().is_empty());
}

#[tokio::test]
async fn rest_route_lists_users() {
    let fetcher = hardened_site().page(
        &format!("{}/?rest_route=/wp/v2/users", SITE),
        200,
        r#"[{"id":1,"name":"Admin","slug":"admin","link":"https://shop.test/author/admin/"}]"#,
    );
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    let enumeration = &result.user_enumeration;
    assert_eq!(enumeration.status, EnumerationStatus::Found);
    assert_eq!(enumeration.users.len(), 1);
    assert_eq!(enumeration.users[0].slug, "admin");
    assert_eq!(
        enumeration.method.as_deref(),
        Some("REST route (/?rest_route=/wp/v2/users)")
    );
    assert_eq!(enumeration.reference.map(|r| r.score), Some(5.3));

    assert_eq!(result.overall_score, 88);
    assert_eq!(result.severity.severity, Severity::Medium);
}

#[tokio::test]
async fn wp_json_is_used_when_rest_route_is_empty() {
    let fetcher = hardened_site()
        .page(&format!("{}/?rest_route=/wp/v2/users", SITE), 200, "[]")
        .page(
            &format!("{}/wp-json/wp/v2/users", SITE),
            200,
            r#"[{"id":2,"name":"Editor","slug":"editor"}]"#,
        );
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    let enumeration = &result.user_enumeration;
    assert_eq!(enumeration.status, EnumerationStatus::Found);
    assert_eq!(
        enumeration.method.as_deref(),
        Some("REST API (/wp-json/wp/v2/users)")
    );
    assert_eq!(enumeration.users.len(), 1);
    assert_eq!(enumeration.users[0].slug, "editor");
}

#[tokio::test]
async fn rest_route_wins_over_wp_json() {
    let fetcher = hardened_site()
        .page(
            &format!("{}/?rest_route=/wp/v2/users", SITE),
            200,
            r#"[{"id":1,"name":"Admin","slug":"admin"}]"#,
        )
        .page(
            &format!("{}/wp-json/wp/v2/users", SITE),
            200,
            r#"[{"id":2,"name":"Editor","slug":"editor"}]"#,
        );
    let auditor = Auditor::new(fetcher);
    let result = auditor.audit(SITE).await.unwrap();

    let enumeration = &result.user_enumeration;
    assert_eq!(
        enumeration.method.as_deref(),
        Some("REST route (/?rest_route=/wp/v2/users)")
    );
    assert_eq!(enumeration.users[0].slug, "admin");
    assert!(
        !auditor
            .fetcher()
            .requested()
            .iter()
            .any(|u| u.ends_with("/wp-json/wp/v2/users"))
    );
}

#[tokio::test]
async fn author_archives_stop_after_three() {
    let auditor = Auditor::new(hardened_site());
    let result = auditor.audit(SITE).await.unwrap();
    assert_eq!(result.user_enumeration.status, EnumerationStatus::NotFound);

    let requested = auditor.fetcher().requested();
    assert!(requested.contains(&format!("{}/?author=3", SITE)));
    assert!(!requested.contains(&format!("{}/?author=4", SITE)));
}

#[tokio::test]
async fn rate_limited_users_endpoint_is_protected() {
    let fetcher = hardened_site().failing(&format!("{}/wp-json/wp/v2/users", SITE), 429);
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    assert_eq!(result.user_enumeration.status, EnumerationStatus::Protected);
    assert!(result.user_enumeration.users.is_empty());
    assert_eq!(result.overall_score, 95);
}

#[tokio::test]
async fn denied_users_endpoint_is_protected() {
    let fetcher = hardened_site().page(
        &format!("{}/?rest_route=/wp/v2/users", SITE),
        401,
        r#"{"code":"rest_user_cannot_view","message":"Sorry, you are not allowed to list users."}"#,
    );
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();
    assert_eq!(result.user_enumeration.status, EnumerationStatus::Protected);
}

#[tokio::test]
async fn subdirectory_install_is_audited_in_place() {
    let fetcher = ScriptedFetcher::default()
        .page(SITE, 200, "<html><body>Our company</body></html>")
        .page(
            &format!("{}/blog", SITE),
            200,
            r#"<html><head><meta name="generator" content="WordPress 6.4.2" /></head></html>"#,
        )
        .page(&format!("{}/blog/wp-login.php", SITE), 200, "<form id=\"loginform\">");

    let auditor = Auditor::new(fetcher);
    let mut progress: Vec<AuditProgress> = Vec::new();
    let result = auditor
        .audit_with_progress(SITE, |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(
        result.detection,
        Detection::Detected {
            subdirectory: Some("/blog".to_string())
        }
    );
    assert_eq!(result.base_url, format!("{}/blog", SITE));
    assert_eq!(result.site.version.as_deref(), Some("6.4.2"));
    assert!(result.site.generator);

    let login = result
        .endpoints
        .iter()
        .find(|e| e.path == "/wp-login.php")
        .unwrap();
    assert_eq!(login.status, EndpointStatus::Accessible);
    assert_eq!(login.url, format!("{}/blog/wp-login.php", SITE));

    let percentages: Vec<u8> = progress.iter().map(|p| p.percentage).collect();
    assert_eq!(percentages, vec![0, 25, 50, 75, 100]);
    assert_eq!(progress.last().map(|p| p.current), Some(4));

    // Users are looked up under the detected base first
    let requested = auditor.fetcher().requested();
    let first_users = requested
        .iter()
        .position(|u| u.contains("rest_route"))
        .unwrap();
    assert_eq!(
        requested[first_users],
        format!("{}/blog/?rest_route=/wp/v2/users", SITE)
    );
}

#[tokio::test]
async fn challenge_page_is_reported_as_blocked() {
    let fetcher = ScriptedFetcher::default().page(
        SITE,
        200,
        "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>",
    );
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    assert!(matches!(result.detection, Detection::Blocked { .. }));
    assert!(!result.is_wordpress());
}

#[tokio::test]
async fn plain_site_is_not_wordpress() {
    let fetcher = ScriptedFetcher::default().page(SITE, 200, "<html><body>Built with Hugo</body></html>");
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    assert_eq!(result.detection, Detection::NotDetected);
    // Checks still run so the report is complete
    assert_eq!(result.endpoints.len(), 19);
}

#[tokio::test]
async fn waf_is_fingerprinted_from_root_headers() {
    let mut headers = hardened_headers();
    headers.insert("Server", "cloudflare");
    headers.insert("CF-RAY", "8a1b2c3d4e5f-AMS");
    let fetcher = ScriptedFetcher::default()
        .page(SITE, 200, HOME)
        .with_headers(SITE, headers);
    let result = Auditor::new(fetcher).audit(SITE).await.unwrap();

    assert_eq!(result.site.waf.as_deref(), Some("Cloudflare"));
    let server = result.headers.iter().find(|h| h.name == "Server").unwrap();
    assert_eq!(server.value.as_deref(), Some("cloudflare"));
}
