//! Check definitions loaded from catalogs and the results they produce.

use serde::{Deserialize, Serialize};

/// How a check is executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Fully automatable with an ordinary audit account.
    #[default]
    Automated,
    /// Requires human review; never touches the database.
    Manual,
    /// Automatable but needs elevated grants (e.g. catalog or server-state views).
    Privileged,
}

impl Classification {
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

/// Compliance predicate evaluated against each query's row set.
///
/// Value predicates inspect the first column of every row and require at
/// least one row. NULL is treated as the empty string and values are trimmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Equals {
        value: String,
        #[serde(default)]
        ignore_case: bool,
    },
    NotEquals {
        value: String,
        #[serde(default)]
        ignore_case: bool,
    },
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
    NoneOf {
        values: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
    AtMost {
        value: f64,
    },
    AtLeast {
        value: f64,
    },
    NoRows,
    HasRows,
}

/// A single catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub id: String,
    pub title: String,
    pub section: String,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub queries: Vec<String>,
    /// Variant for multi-tenant container databases (Oracle CDB).
    #[serde(default)]
    pub multitenant_queries: Option<Vec<String>>,
    #[serde(default)]
    pub predicate: Option<Predicate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,
}

fn default_level() -> u8 {
    1
}

impl CheckDefinition {
    /// Statements to run for a target, honoring the multi-tenant variant.
    pub fn queries_for(&self, multitenant: bool) -> &[String] {
        match (&self.multitenant_queries, multitenant) {
            (Some(variant), true) if !variant.is_empty() => variant,
            _ => &self.queries,
        }
    }

    /// Every statement the check can issue, across variants.
    pub fn all_queries(&self) -> impl Iterator<Item = &String> {
        self.queries
            .iter()
            .chain(self.multitenant_queries.iter().flatten())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Passed,
    Failed,
    Manual,
    #[serde(rename = "No_Permission")]
    NoPermission,
    /// Query failed for a reason other than privileges (`check_error` policy only).
    Error,
}

impl CheckStatus {
    pub const ALL: [CheckStatus; 5] = [
        Self::Passed,
        Self::Failed,
        Self::Manual,
        Self::NoPermission,
        Self::Error,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Manual => "Manual",
            Self::NoPermission => "No Permission",
            Self::Error => "Error",
        }
    }

    /// Stable machine key, also used as the CSS class in HTML reports.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Manual => "manual",
            Self::NoPermission => "no_permission",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of running one check, created once and never mutated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckResult {
    pub check_id: String,
    pub title: String,
    pub section: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn new(check: &CheckDefinition, status: CheckStatus) -> Self {
        Self {
            check_id: check.id.clone(),
            title: check.title.clone(),
            section: check.section.clone(),
            status,
            observed: None,
            detail: None,
        }
    }

    pub fn with_observed(mut self, observed: Option<String>) -> Self {
        self.observed = observed;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
