//! Local audit history
//!
//! A small JSON file holding the most recent audits, newest first, one entry
//! per URL. The history is a convenience: read and write failures are logged
//! and otherwise ignored.

use crate::findings::AuditResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default history file name
pub const HISTORY_FILE: &str = "wp-audit-history.json";

/// Entries kept
pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub is_wordpress: bool,
}

impl From<&AuditResult> for HistoryEntry {
    fn from(result: &AuditResult) -> Self {
        Self {
            url: result.url.clone(),
            timestamp: result.timestamp,
            score: result.overall_score,
            is_wordpress: result.is_wordpress(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(HISTORY_FILE)
    }
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored entries, empty when the file is missing or unreadable
    pub fn load(&self) -> Vec<HistoryEntry> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no history loaded");
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            debug!(path = %self.path.display(), error = %e, "history file is not valid JSON");
            Vec::new()
        })
    }

    /// Put `result` at the front, dropping an older entry for the same URL
    pub fn record(&self, result: &AuditResult) -> Vec<HistoryEntry> {
        let entry = HistoryEntry::from(result);
        let mut entries: Vec<HistoryEntry> = self
            .load()
            .into_iter()
            .filter(|h| h.url != entry.url)
            .collect();
        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY);

        self.save(&entries);
        entries
    }

    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove history");
        }
    }

    fn save(&self, entries: &[HistoryEntry]) {
        let written = serde_json::to_string_pretty(entries)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&self.path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            debug!(path = %self.path.display(), error = %e, "could not save history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CvssScore, Severity};
    use crate::findings::{Detection, EnumerationStatus, SiteInfo, UserEnumeration};

    fn result(url: &str, score: u8) -> AuditResult {
        AuditResult {
            url: url.to_string(),
            base_url: url.to_string(),
            timestamp: Utc::now(),
            detection: Detection::Detected { subdirectory: None },
            headers: Vec::new(),
            endpoints: Vec::new(),
            user_enumeration: UserEnumeration {
                status: EnumerationStatus::NotFound,
                users: Vec::new(),
                method: None,
                description: String::new(),
                reference: None,
            },
            site: SiteInfo::default(),
            overall_score: score,
            severity: CvssScore {
                score: 0.0,
                severity: Severity::None,
                vector: String::new(),
            },
        }
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("none.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(HistoryStore::new(path).load().is_empty());
    }

    #[test]
    fn newest_first_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"));

        store.record(&result("https://a.test", 50));
        store.record(&result("https://b.test", 60));
        store.record(&result("https://a.test", 70));

        let entries = store.load();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://a.test");
        assert_eq!(entries[0].score, 70);
        assert!(entries[0].is_wordpress);
        assert_eq!(entries[1].url, "https://b.test");
    }

    #[test]
    fn keeps_at_most_ten() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"));
        for i in 0..12 {
            store.record(&result(&format!("https://site{}.test", i), 90));
        }
        let entries = store.load();
        assert_eq!(entries.len(), MAX_HISTORY);
        assert_eq!(entries[0].url, "https://site11.test");
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"));
        store.record(&result("https://a.test", 50));
        store.clear();
        assert!(store.load().is_empty());
        // Clearing twice is harmless
        store.clear();
    }

    #[test]
    fn unwritable_location_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("missing").join("h.json"));
        let entries = store.record(&result("https://a.test", 50));
        assert_eq!(entries.len(), 1);
        assert!(store.load().is_empty());
    }
}
