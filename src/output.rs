//! Output formatting for audit results

use crate::catalog::Severity;
use crate::error::{Error, Result};
use crate::findings::{
    AuditResult, Detection, EndpointFinding, EndpointStatus, EnumerationStatus, HeaderFinding,
    HeaderStatus,
};
use crate::probes::Risk;
use crate::remediation::{Level, Recommendation, recommendations};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL,
};
use serde::Serialize;
use std::io::Write;
use std::str::FromStr;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table output
    #[default]
    Human,
    /// JSON output
    Json,
    /// No output (silent mode)
    None,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// Sort order for the header and endpoint tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSort {
    /// Worst findings first (default)
    #[default]
    Risk,
    /// Alphabetically by name
    Name,
    /// Accessible or failing entries first, then by risk
    Status,
}

impl FromStr for OutputSort {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "risk" => Ok(Self::Risk),
            "name" => Ok(Self::Name),
            "status" => Ok(Self::Status),
            _ => Err(Error::InvalidOutputSort(s.to_string())),
        }
    }
}

/// Configuration for output formatting
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub sort: OutputSort,
}

impl OutputConfig {
    pub fn new(format: OutputFormat, sort: OutputSort) -> Self {
        Self { format, sort }
    }
}

/// JSON document: the audit result plus its recommendations
#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    result: &'a AuditResult,
    recommendations: Vec<Recommendation>,
}

/// Output the audit result
pub fn output_result<W: Write>(
    result: &AuditResult,
    config: &OutputConfig,
    writer: &mut W,
) -> Result<()> {
    match config.format {
        OutputFormat::Human => output_human(result, config, writer),
        OutputFormat::Json => output_json(result, writer),
        OutputFormat::None => Ok(()),
    }
}

fn output_json<W: Write>(result: &AuditResult, writer: &mut W) -> Result<()> {
    let report = Report {
        result,
        recommendations: recommendations(result),
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer).map_err(Error::OutputFailed)?;
    Ok(())
}

fn output_human<W: Write>(result: &AuditResult, config: &OutputConfig, writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", summary_table(result)).map_err(Error::OutputFailed)?;

    if !result.headers.is_empty() {
        writeln!(writer, "\nSecurity headers").map_err(Error::OutputFailed)?;
        writeln!(writer, "{}", header_table(&result.headers, config.sort))
            .map_err(Error::OutputFailed)?;
    }

    if !result.endpoints.is_empty() {
        writeln!(writer, "\nSensitive endpoints").map_err(Error::OutputFailed)?;
        writeln!(writer, "{}", endpoint_table(&result.endpoints, config.sort))
            .map_err(Error::OutputFailed)?;
    }

    writeln!(writer, "\nUser enumeration").map_err(Error::OutputFailed)?;
    writeln!(writer, "{}", user_table(result)).map_err(Error::OutputFailed)?;

    writeln!(writer, "\nRecommendations").map_err(Error::OutputFailed)?;
    writeln!(writer, "{}", recommendation_table(&recommendations(result)))
        .map_err(Error::OutputFailed)
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::DarkRed,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::None => Color::Green,
    }
}

fn score_color(score: u8) -> Color {
    match score {
        80.. => Color::Green,
        50..80 => Color::Yellow,
        _ => Color::Red,
    }
}

fn summary_table(result: &AuditResult) -> Table {
    let detection = match &result.detection {
        Detection::Detected { subdirectory: None } => "Yes".to_string(),
        Detection::Detected {
            subdirectory: Some(dir),
        } => format!("Yes (in {})", dir),
        Detection::NotDetected => "No".to_string(),
        Detection::Blocked { reason } => format!("Blocked: {}", reason),
    };

    let mut table = new_table(&["Site", result.url.as_str()]);
    table.add_row(vec![Cell::new("WordPress"), Cell::new(detection)]);
    table.add_row(vec![
        Cell::new("Version"),
        Cell::new(or_dash(result.site.version.as_deref())),
    ]);
    table.add_row(vec![
        Cell::new("Theme"),
        Cell::new(or_dash(result.site.theme.as_deref())),
    ]);
    table.add_row(vec![
        Cell::new("WAF"),
        Cell::new(or_dash(result.site.waf.as_deref())),
    ]);
    table.add_row(vec![
        Cell::new("HTTPS"),
        Cell::new(if result.site.tls { "Yes" } else { "No" }),
    ]);
    table.add_row(vec![
        Cell::new("Score"),
        Cell::new(format!("{}/100", result.overall_score))
            .fg(score_color(result.overall_score))
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Severity"),
        Cell::new(format!(
            "{} ({:.1})",
            result.severity.severity, result.severity.score
        ))
        .fg(severity_color(result.severity.severity)),
    ]);
    table
}

fn header_status_cell(status: HeaderStatus) -> Cell {
    let color = match status {
        HeaderStatus::Secure => Color::Green,
        HeaderStatus::Info => Color::DarkGrey,
        HeaderStatus::Warning => Color::Yellow,
        HeaderStatus::Vulnerable => Color::Red,
    };
    Cell::new(status.to_string())
        .fg(color)
        .set_alignment(CellAlignment::Center)
}

fn header_table(headers: &[HeaderFinding], sort: OutputSort) -> Table {
    let mut rows: Vec<&HeaderFinding> = headers.iter().collect();
    match sort {
        OutputSort::Name => rows.sort_by(|a, b| a.name.cmp(&b.name)),
        // Headers carry no risk tier, their status is the risk
        OutputSort::Risk | OutputSort::Status => {
            rows.sort_by(|a, b| b.status.cmp(&a.status).then_with(|| a.name.cmp(&b.name)))
        }
    }

    let mut table = new_table(&["Header", "Value", "Status", "CWE"]);
    for header in rows {
        table.add_row(vec![
            Cell::new(&header.name),
            Cell::new(or_dash(header.value.as_deref())),
            header_status_cell(header.status),
            Cell::new(header.reference.map_or("-", |r| r.cwe)),
        ]);
    }
    table
}

fn risk_cell(risk: Risk) -> Cell {
    let color = match risk {
        Risk::Critical => Color::Red,
        Risk::High => Color::DarkRed,
        Risk::Medium => Color::Yellow,
        Risk::Low => Color::Cyan,
        Risk::Info => Color::DarkGrey,
    };
    Cell::new(risk.to_string()).fg(color)
}

fn endpoint_table(endpoints: &[EndpointFinding], sort: OutputSort) -> Table {
    let mut rows: Vec<&EndpointFinding> = endpoints.iter().collect();
    match sort {
        OutputSort::Risk => rows.sort_by(|a, b| {
            b.risk
                .cmp(&a.risk)
                .then_with(|| b.status.cmp(&a.status))
                .then_with(|| a.name.cmp(&b.name))
        }),
        OutputSort::Name => rows.sort_by(|a, b| a.name.cmp(&b.name)),
        OutputSort::Status => rows.sort_by(|a, b| {
            b.status
                .cmp(&a.status)
                .then_with(|| b.risk.cmp(&a.risk))
                .then_with(|| a.name.cmp(&b.name))
        }),
    }

    let mut table = new_table(&["Endpoint", "Path", "Risk", "HTTP", "Status"]);
    for endpoint in rows {
        let status = match endpoint.status {
            EndpointStatus::Accessible => Cell::new("Accessible").fg(Color::Red),
            EndpointStatus::Blocked => Cell::new("Blocked").fg(Color::Green),
        };
        let code = if endpoint.status_code == 0 {
            "-".to_string()
        } else {
            endpoint.status_code.to_string()
        };
        table.add_row(vec![
            Cell::new(&endpoint.name),
            Cell::new(&endpoint.path),
            risk_cell(endpoint.risk),
            Cell::new(code).set_alignment(CellAlignment::Right),
            status.set_alignment(CellAlignment::Center),
        ]);
    }
    table
}

fn user_table(result: &AuditResult) -> Table {
    let enumeration = &result.user_enumeration;
    let status = match enumeration.status {
        EnumerationStatus::Found => Cell::new("Exposed").fg(Color::Red),
        EnumerationStatus::Protected => Cell::new("Protected").fg(Color::Green),
        EnumerationStatus::NotFound => Cell::new("Not found").fg(Color::Green),
    };

    let mut table = new_table(&["ID", "Slug", "Name"]);
    for user in &enumeration.users {
        table.add_row(vec![
            Cell::new(user.id).set_alignment(CellAlignment::Right),
            Cell::new(&user.slug),
            Cell::new(&user.name),
        ]);
    }
    table.add_row(vec![
        status,
        Cell::new(or_dash(enumeration.method.as_deref())),
        Cell::new(&enumeration.description),
    ]);
    table
}

fn recommendation_table(items: &[Recommendation]) -> Table {
    let mut table = new_table(&["Level", "Recommendation", "Details"]);
    for item in items {
        let color = match item.level {
            Level::Critical => Color::Red,
            Level::Warning => Color::Yellow,
            Level::Info => Color::Blue,
        };
        table.add_row(vec![
            Cell::new(item.level.to_string()).fg(color),
            Cell::new(&item.title).add_attribute(Attribute::Bold),
            Cell::new(&item.description),
        ]);
    }
    table
}
