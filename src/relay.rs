//! Relay transport
//!
//! Every request to the audited site goes through one of several public
//! relay services. The transport picks a relay, fails over to the next one
//! when a relay misbehaves, remembers which relays are currently unhealthy
//! and keeps successful responses for a short time.

use crate::error::{Error, RelayFailure, Result};
use futures::future::join_all;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::form_urlencoded;

/// User agent for requests (standard Chrome on Windows)
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGES: &str = "en-US,en;q=0.9";

/// Per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;

/// How long a successful response stays in the cache
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// How long an unhealthy relay is skipped before it gets another chance
pub const DEFAULT_HEALTH_GRACE: Duration = Duration::from_secs(120);

/// Consecutive failures after which a relay is considered unhealthy
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Bodies shorter than this are usually a relay's own error page
pub const MIN_BODY_LEN: usize = 100;

/// Default number of simultaneous existence probes
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// A relay service that forwards a GET to an arbitrary URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    /// Display name used in diagnostics
    pub name: String,
    /// URL prefix; the percent-encoded target URL is appended to it
    pub prefix: String,
}

impl RelayEndpoint {
    /// Create a relay endpoint from a name and URL prefix
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    /// Built-in public relays, most reliable first
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("AllOrigins", "https://api.allorigins.win/raw?url="),
            Self::new("CorsProxy.io", "https://corsproxy.io/?"),
            Self::new("CodeTabs", "https://api.codetabs.com/v1/proxy?quest="),
        ]
    }

    /// Parse a `NAME=PREFIX` pair
    pub fn parse(pair: &str) -> Result<Self> {
        let (name, prefix) = pair
            .split_once('=')
            .ok_or_else(|| Error::InvalidUrl(format!("relay '{}' must be NAME=PREFIX", pair)))?;
        let (name, prefix) = (name.trim(), prefix.trim());

        if name.is_empty() {
            return Err(Error::InvalidUrl(format!("relay '{}' has no name", pair)));
        }
        if !prefix.starts_with("http://") && !prefix.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "relay prefix '{}' must start with http:// or https://",
                prefix
            )));
        }

        Ok(Self::new(name, prefix))
    }

    /// Build the relayed URL for a target
    pub fn proxied_url(&self, target: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", self.prefix, encoded)
    }
}

/// Response headers in arrival order, looked up case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any earlier value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// A response received through a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    /// HTTP status as reported by the relay
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl RelayResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 or 403: the resource is there but access is denied
    pub fn is_denied(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

/// Something that can GET an absolute URL on the audited site
///
/// [`RelayTransport`] is the production implementation; tests plug in
/// scripted fetchers.
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, consulting the response cache when `use_cache` is set
    fn fetch(&self, url: &str, use_cache: bool)
    -> impl Future<Output = Result<RelayResponse>> + Send;
}

/// Decide whether a relayed response counts as a usable answer
///
/// 2xx and 3xx are accepted, as are 401 and 403 since they prove the
/// resource exists. Everything else, and any body shorter than
/// `min_body_len`, is rejected with a reason.
pub fn is_acceptable(
    status: u16,
    body_len: usize,
    min_body_len: usize,
) -> std::result::Result<(), String> {
    let status_ok = (200..400).contains(&status) || matches!(status, 401 | 403);
    if !status_ok {
        return Err(format!("HTTP {}", status));
    }
    if body_len < min_body_len {
        return Err(format!("empty response ({} bytes)", body_len));
    }
    Ok(())
}

/// Run `attempt` for each relay index in `order` until one succeeds
///
/// At most `order.len()` attempts are made. On success the winning index is
/// returned with the value; otherwise every failure, in attempt order.
pub async fn try_in_rotation<T, F, Fut>(
    order: &[usize],
    mut attempt: F,
) -> std::result::Result<(usize, T), Vec<RelayFailure>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, RelayFailure>>,
{
    let mut failures = Vec::with_capacity(order.len());
    for &index in order {
        match attempt(index).await {
            Ok(value) => return Ok((index, value)),
            Err(failure) => failures.push(failure),
        }
    }
    Err(failures)
}

/// Tunables for [`RelayTransport`]
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub endpoints: Vec<RelayEndpoint>,
    /// Per-attempt timeout; the in-flight request is dropped when it elapses
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub health: HealthPolicy,
    pub min_body_len: usize,
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoints: RelayEndpoint::defaults(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            cache_ttl: DEFAULT_CACHE_TTL,
            health: HealthPolicy::default(),
            min_body_len: MIN_BODY_LEN,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// When a relay is skipped because of recent failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub failure_threshold: u32,
    pub grace: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            grace: DEFAULT_HEALTH_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RelayHealth {
    consecutive_failures: u32,
    last_success: Option<Instant>,
}

impl RelayHealth {
    /// A relay that never succeeded counts its grace from `epoch`
    fn is_available(&self, now: Instant, epoch: Instant, policy: HealthPolicy) -> bool {
        if self.consecutive_failures < policy.failure_threshold {
            return true;
        }
        let since = self.last_success.unwrap_or(epoch);
        now.saturating_duration_since(since) > policy.grace
    }
}

/// Relay indices in rotation order starting at `preferred`, unhealthy ones
/// removed. Falls back to every relay when none is healthy.
fn attempt_order(
    health: &[RelayHealth],
    preferred: usize,
    now: Instant,
    epoch: Instant,
    policy: HealthPolicy,
) -> Vec<usize> {
    let len = health.len();
    let rotation: Vec<usize> = (0..len).map(|i| (preferred + i) % len).collect();
    let healthy: Vec<usize> = rotation
        .iter()
        .copied()
        .filter(|&i| health[i].is_available(now, epoch, policy))
        .collect();

    if healthy.is_empty() { rotation } else { healthy }
}

#[derive(Debug)]
struct RelayState {
    health: Vec<RelayHealth>,
    preferred: usize,
}

#[derive(Debug)]
struct CachedResponse {
    response: RelayResponse,
    stored_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    }
}

/// Relay-backed [`Fetcher`] with health tracking and a response cache
///
/// Health state and cache are shared by every concurrent probe of every
/// audit run through the same instance.
#[derive(Debug)]
pub struct RelayTransport {
    client: Client,
    config: RelayConfig,
    created_at: Instant,
    state: Mutex<RelayState>,
    cache: Mutex<HashMap<String, CachedResponse>>,
}

/// Builder for configuring a RelayTransport
#[derive(Debug, Clone, Default)]
pub struct RelayTransportBuilder {
    config: RelayConfig,
}

impl RelayTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the relay list
    pub fn endpoints(mut self, endpoints: Vec<RelayEndpoint>) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// How long a relay marked unhealthy is skipped
    pub fn health_grace(mut self, grace: Duration) -> Self {
        self.config.health.grace = grace;
        self
    }

    pub fn failure_threshold(mut self, failures: u32) -> Self {
        self.config.health.failure_threshold = failures;
        self
    }

    pub fn min_body_len(mut self, len: usize) -> Self {
        self.config.min_body_len = len;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the RelayTransport with the configured options
    pub fn build(self) -> Result<RelayTransport> {
        RelayTransport::from_config(self.config)
    }
}

impl RelayTransport {
    /// Transport over the built-in relays with default settings
    pub fn new() -> Result<Self> {
        Self::from_config(RelayConfig::default())
    }

    /// Create a builder for configuring transport options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use wp_relay_audit::RelayTransport;
    ///
    /// let transport = RelayTransport::builder()
    ///     .timeout(Duration::from_secs(10))
    ///     .build()?;
    /// # Ok::<(), wp_relay_audit::Error>(())
    /// ```
    pub fn builder() -> RelayTransportBuilder {
        RelayTransportBuilder::new()
    }

    pub fn from_config(config: RelayConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::HttpClient(
                "at least one relay endpoint is required".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        let state = RelayState {
            health: vec![RelayHealth::default(); config.endpoints.len()],
            preferred: 0,
        };

        Ok(Self {
            client,
            config,
            created_at: Instant::now(),
            state: Mutex::new(state),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Consecutive failures currently recorded for the named relay
    pub fn consecutive_failures(&self, relay: &str) -> Option<u32> {
        let index = self.config.endpoints.iter().position(|e| e.name == relay)?;
        Some(lock(&self.state).health[index].consecutive_failures)
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    fn cached(&self, url: &str) -> Option<RelayResponse> {
        let mut cache = lock(&self.cache);
        let fresh = cache
            .get(url)
            .map(|entry| entry.stored_at.elapsed() < self.config.cache_ttl)?;

        if fresh {
            cache.get(url).map(|entry| entry.response.clone())
        } else {
            cache.remove(url);
            None
        }
    }

    fn store(&self, url: &str, response: &RelayResponse) {
        lock(&self.cache).insert(
            url.to_string(),
            CachedResponse {
                response: response.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    fn current_order(&self) -> Vec<usize> {
        let state = lock(&self.state);
        attempt_order(
            &state.health,
            state.preferred,
            Instant::now(),
            self.created_at,
            self.config.health,
        )
    }

    fn record_success(&self, index: usize) {
        let mut state = lock(&self.state);
        state.health[index] = RelayHealth {
            consecutive_failures: 0,
            last_success: Some(Instant::now()),
        };
        state.preferred = index;
    }

    fn record_failure(&self, index: usize) {
        let mut state = lock(&self.state);
        state.health[index].consecutive_failures += 1;
    }

    async fn attempt(
        &self,
        index: usize,
        target: &str,
    ) -> std::result::Result<RelayResponse, RelayFailure> {
        let endpoint = &self.config.endpoints[index];
        let result = self.send(endpoint, target).await;

        if let Err(failure) = &result {
            self.record_failure(index);
            debug!(relay = %endpoint.name, url = target, reason = %failure.reason, "relay attempt rejected");
        }
        result
    }

    async fn send(
        &self,
        endpoint: &RelayEndpoint,
        target: &str,
    ) -> std::result::Result<RelayResponse, RelayFailure> {
        let failure = |reason: String, status: Option<u16>| RelayFailure {
            relay: endpoint.name.clone(),
            reason,
            status,
        };

        let response = self
            .client
            .get(endpoint.proxied_url(target))
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGES)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| failure(describe(&e), None))?;

        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| failure(describe(&e), Some(status)))?;

        is_acceptable(status, body.len(), self.config.min_body_len)
            .map_err(|reason| failure(reason, Some(status)))?;

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }
}

impl Fetcher for RelayTransport {
    async fn fetch(&self, url: &str, use_cache: bool) -> Result<RelayResponse> {
        if use_cache && let Some(hit) = self.cached(url) {
            debug!(url, "relay cache hit");
            return Ok(hit);
        }

        let order = self.current_order();
        match try_in_rotation(&order, |index| self.attempt(index, url)).await {
            Ok((index, response)) => {
                debug!(relay = %self.config.endpoints[index].name, url, status = response.status, "relay accepted");
                self.record_success(index);
                if use_cache && response.is_success() {
                    self.store(url, &response);
                }
                Ok(response)
            }
            Err(failures) => {
                warn!(url, attempts = failures.len(), "every relay failed");
                Err(Error::RelayExhausted { failures })
            }
        }
    }
}

/// Result of an existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub exists: bool,
    /// 0 when no response could be obtained
    pub status_code: u16,
}

impl ProbeOutcome {
    pub const UNREACHABLE: Self = Self {
        exists: false,
        status_code: 0,
    };
}

/// Check whether `url` exists; transport errors read as "does not exist"
pub async fn probe_exists<F: Fetcher>(fetcher: &F, url: &str) -> ProbeOutcome {
    match fetcher.fetch(url, true).await {
        Ok(response) => ProbeOutcome {
            exists: response.is_success() || response.is_denied(),
            status_code: response.status,
        },
        Err(e) => {
            debug!(url, error = %e, "existence probe failed");
            ProbeOutcome::UNREACHABLE
        }
    }
}

/// Probe many URLs, at most `concurrency` at a time
///
/// URLs are split into batches; each batch is probed concurrently and must
/// finish before the next one starts.
pub async fn probe_many_exist<F: Fetcher>(
    fetcher: &F,
    urls: &[String],
    concurrency: usize,
) -> HashMap<String, ProbeOutcome> {
    let mut results = HashMap::with_capacity(urls.len());

    for batch in urls.chunks(concurrency.max(1)) {
        let outcomes = join_all(batch.iter().map(|url| probe_exists(fetcher, url))).await;
        results.extend(batch.iter().cloned().zip(outcomes));
    }

    results
}
