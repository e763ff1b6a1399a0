//! Error types for wp-relay-audit

use std::fmt;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single relay attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// Display name of the relay
    pub relay: String,
    /// Human-readable reason
    pub reason: String,
    /// HTTP status returned through the relay, if any response arrived
    pub status: Option<u16>,
}

impl fmt::Display for RelayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.relay, self.reason)
    }
}

fn join_failures(failures: &[RelayFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during audit operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid URL provided
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to create HTTP client
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// Every relay failed or answered with an unacceptable response
    #[error("no relay returned a usable response ({})", join_failures(.failures))]
    RelayExhausted {
        /// One entry per attempted relay, in attempt order
        failures: Vec<RelayFailure>,
    },

    /// The target's root page could not be fetched at all
    #[error("{0}")]
    ConnectionFailed(String),

    /// Invalid output format specified
    #[error("invalid output format: '{0}' (valid: human, json, none)")]
    InvalidOutputFormat(String),

    /// Invalid output sort order specified
    #[error("invalid output sort: '{0}' (valid: risk, name, status)")]
    InvalidOutputSort(String),

    /// Output operation failed
    #[error("output failed: {0}")]
    OutputFailed(#[source] std::io::Error),

    /// Writing the export file failed
    #[error("export failed: {0}")]
    ExportFailed(#[source] std::io::Error),

    /// JSON serialization failed
    #[error("JSON serialization failed")]
    SerializationFailed(#[from] serde_json::Error),
}

impl Error {
    /// Statuses seen across relay attempts, if this is a relay exhaustion
    pub fn relay_statuses(&self) -> Vec<u16> {
        match self {
            Self::RelayExhausted { failures } => failures.iter().filter_map(|f| f.status).collect(),
            _ => Vec::new(),
        }
    }
}
