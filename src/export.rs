//! JSON export of a finished audit

use crate::error::{Error, Result};
use crate::findings::AuditResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct ExportDocument<'a> {
    #[serde(flatten)]
    result: &'a AuditResult,
    exported_at: DateTime<Utc>,
}

/// `wp-audit-<hostname>-<unix millis>.json`
pub fn export_file_name(result: &AuditResult, at: DateTime<Utc>) -> String {
    let host = result.hostname().unwrap_or_else(|| "unknown".to_string());
    format!("wp-audit-{}-{}.json", host, at.timestamp_millis())
}

/// Pretty-printed export document
pub fn export_json(result: &AuditResult, at: DateTime<Utc>) -> Result<String> {
    let document = ExportDocument {
        result,
        exported_at: at,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write the export into `dir`, returning the file path
pub fn write_export(result: &AuditResult, dir: &Path) -> Result<PathBuf> {
    let now = Utc::now();
    let path = dir.join(export_file_name(result, now));
    let json = export_json(result, now)?;

    fs::create_dir_all(dir).map_err(Error::ExportFailed)?;
    fs::write(&path, json).map_err(Error::ExportFailed)?;

    info!(path = %path.display(), "audit exported");
    Ok(path)
}
