//! Overall 0-100 score

use crate::findings::{EndpointFinding, EndpointStatus, HeaderFinding, HeaderStatus};
use crate::probes::{Risk, is_critical_header};

const CRITICAL_HEADER_PENALTY: u32 = 8;
const HEADER_PENALTY: u32 = 4;
const WEAK_HEADER_PENALTY: u32 = 2;
const USER_ENUMERATION_PENALTY: u32 = 12;
const VERSION_DISCLOSURE_PENALTY: u32 = 4;

/// Reported instead of 100 when checks ran and nothing was deducted
pub const CLEAN_SCORE: u8 = 95;

/// A reachable site never scores below this
pub const MIN_SCORE: u8 = 10;

/// Points deducted for an accessible endpoint of the given tier
pub fn risk_penalty(risk: Risk) -> u32 {
    match risk {
        Risk::Critical => 12,
        Risk::High => 8,
        Risk::Medium => 4,
        Risk::Low => 2,
        Risk::Info => 0,
    }
}

fn header_penalty(finding: &HeaderFinding) -> u32 {
    match finding.status {
        HeaderStatus::Vulnerable if is_critical_header(&finding.name) => CRITICAL_HEADER_PENALTY,
        HeaderStatus::Vulnerable => HEADER_PENALTY,
        HeaderStatus::Warning => WEAK_HEADER_PENALTY,
        HeaderStatus::Secure | HeaderStatus::Info => 0,
    }
}

/// Score a site from 0 (worst) to 100
///
/// With at least one header or endpoint finding, a clean run scores
/// [`CLEAN_SCORE`] and a heavily penalized one never drops under
/// [`MIN_SCORE`].
pub fn overall_score(
    headers: &[HeaderFinding],
    endpoints: &[EndpointFinding],
    user_enum_found: bool,
    version_disclosed: bool,
) -> u8 {
    let header_total: u32 = headers.iter().map(header_penalty).sum();
    let endpoint_total: u32 = endpoints
        .iter()
        .filter(|e| e.status == EndpointStatus::Accessible)
        .map(|e| risk_penalty(e.risk))
        .sum();

    let deductions = header_total
        + endpoint_total
        + if user_enum_found { USER_ENUMERATION_PENALTY } else { 0 }
        + if version_disclosed { VERSION_DISCLOSURE_PENALTY } else { 0 };

    let raw = 100_i64 - i64::from(deductions);
    let clamped = raw.clamp(0, 100) as u8;

    let has_findings = !headers.is_empty() || !endpoints.is_empty();
    if !has_findings {
        return clamped;
    }
    if deductions == 0 {
        return CLEAN_SCORE;
    }
    clamped.max(MIN_SCORE)
}
