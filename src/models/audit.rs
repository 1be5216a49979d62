//! Audit run context: target, server profile, ordered results and derived counts.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::check::{CheckResult, CheckStatus};
use crate::models::engine::EngineType;

/// Output format for the rendered report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "Invalid format '{other}'. Supported: html, json, csv"
            )),
        }
    }
}

/// Facts about the audited server, gathered once per run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ServerProfile {
    pub version: Option<String>,
    /// Oracle container database (CDB); always false for other engines.
    pub multitenant: bool,
}

/// Per-status tally derived from a result sequence.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub passed: usize,
    pub failed: usize,
    pub manual: usize,
    pub no_permission: usize,
    pub error: usize,
}

impl StatusCounts {
    /// Tally a result sequence. This is the only way counts are produced.
    pub fn tally(results: &[CheckResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.status {
                CheckStatus::Passed => counts.passed += 1,
                CheckStatus::Failed => counts.failed += 1,
                CheckStatus::Manual => counts.manual += 1,
                CheckStatus::NoPermission => counts.no_permission += 1,
                CheckStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn get(&self, status: CheckStatus) -> usize {
        match status {
            CheckStatus::Passed => self.passed,
            CheckStatus::Failed => self.failed,
            CheckStatus::Manual => self.manual,
            CheckStatus::NoPermission => self.no_permission,
            CheckStatus::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.manual + self.no_permission + self.error
    }

    /// Counts keyed by status label, zero entries included.
    pub fn by_label(&self) -> BTreeMap<&'static str, usize> {
        CheckStatus::ALL
            .iter()
            .map(|s| (s.label(), self.get(*s)))
            .collect()
    }
}

/// One audit, scoped to a single request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRun {
    #[serde(skip)]
    pub id: Uuid,
    pub engine: EngineType,
    pub standard: String,
    pub catalog_version: String,
    pub target: String,
    pub profile: ServerProfile,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
}

impl AuditRun {
    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: CheckStatus) -> CheckResult {
        CheckResult {
            check_id: id.to_string(),
            title: format!("check {id}"),
            section: "1".to_string(),
            status,
            observed: None,
            detail: None,
        }
    }

    #[test]
    fn tally_matches_sequence_length() {
        let results = vec![
            result("1.1", CheckStatus::Passed),
            result("1.2", CheckStatus::Failed),
            result("1.3", CheckStatus::Manual),
            result("1.4", CheckStatus::NoPermission),
            result("1.5", CheckStatus::Passed),
        ];
        let counts = StatusCounts::tally(&results);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.manual, 1);
        assert_eq!(counts.no_permission, 1);
        assert_eq!(counts.total(), results.len());
    }

    #[test]
    fn by_label_includes_zero_entries() {
        let counts = StatusCounts::tally(&[]);
        let labels = counts.by_label();
        assert_eq!(labels.len(), CheckStatus::ALL.len());
        assert!(labels.values().all(|&n| n == 0));
    }

    #[test]
    fn report_format_parsing() {
        assert_eq!("HTML".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
