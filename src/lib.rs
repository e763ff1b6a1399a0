//! WP Relay Audit - WordPress security audit through public relay services
//!
//! Audits a WordPress site the way a browser-only tool would: every request
//! goes through a CORS relay, with failover between relays, health tracking
//! and a short-lived response cache. An audit grades security headers,
//! probes sensitive paths, attempts user enumeration, extracts version and
//! theme details and scores the result.
//!
//! # Example
//!
//! ```no_run
//! use wp_relay_audit::{Auditor, RelayTransport};
//!
//! #[tokio::main]
//! async fn main() -> wp_relay_audit::Result<()> {
//!     let auditor = Auditor::new(RelayTransport::new()?);
//!     let result = auditor.audit("example.com").await?;
//!     println!("Score: {}/100 ({})", result.overall_score, result.severity.severity);
//!     Ok(())
//! }
//! ```

pub mod analyze;
pub mod audit;
pub mod catalog;
pub mod error;
pub mod export;
pub mod findings;
pub mod history;
pub mod output;
pub mod probes;
pub mod relay;
pub mod remediation;
pub mod scoring;

pub use audit::{AuditConfig, Auditor, normalize_url};
pub use catalog::{CvssScore, SecurityReference, Severity};
pub use error::{Error, RelayFailure, Result};
pub use findings::{
    AuditProgress, AuditResult, Detection, EndpointFinding, EndpointStatus, EnumerationStatus,
    HeaderFinding, HeaderStatus, SiteInfo, UserEnumeration, WpUser,
};
pub use history::{HistoryEntry, HistoryStore};
pub use output::{OutputConfig, OutputFormat, OutputSort, output_result};
pub use relay::{
    Fetcher, Headers, RelayEndpoint, RelayResponse, RelayTransport, RelayTransportBuilder,
};
pub use remediation::{Recommendation, recommendations};
