//! Check runner: evaluates a catalog against one connection, in catalog order.
//!
//! Each check runs exactly once. A failing check never aborts the run; only
//! cancellation or the run deadline does, and those are checked between
//! checks, never mid-query.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::db::{Connection, QueryError};
use crate::models::audit::{AuditRun, ServerProfile};
use crate::models::check::{CheckDefinition, CheckResult, CheckStatus};
use crate::services::evaluation;

/// How query failures other than missing privileges are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorPolicy {
    /// Record as No Permission, matching the historical report semantics.
    #[default]
    NoPermission,
    /// Record as a distinct Error status.
    CheckError,
}

impl FromStr for QueryErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "no_permission" => Ok(Self::NoPermission),
            "check_error" => Ok(Self::CheckError),
            other => Err(format!("unknown query error policy '{other}'")),
        }
    }
}

/// Why a run stopped before covering the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("audit cancelled after {completed} checks")]
    Cancelled { completed: usize },

    #[error("audit exceeded its time limit after {completed} checks")]
    DeadlineExceeded { completed: usize },
}

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query_timeout: Duration,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
    pub error_policy: QueryErrorPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            deadline: None,
            cancel: CancellationToken::new(),
            error_policy: QueryErrorPolicy::default(),
        }
    }
}

/// Evaluate every check in `catalog` against `conn`.
///
/// `target` describes the audited database for the report and must not
/// contain secrets.
pub async fn run<C: Connection>(
    conn: &mut C,
    catalog: &Catalog,
    target: String,
    options: &RunOptions,
) -> Result<AuditRun, RunError> {
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();

    let profile = match tokio::time::timeout(options.query_timeout, conn.profile()).await {
        Ok(Ok(profile)) => profile,
        Ok(Err(e)) => {
            tracing::warn!(%run_id, error = %e, "Server profile unavailable; using defaults");
            ServerProfile::default()
        }
        Err(_) => {
            tracing::warn!(%run_id, "Server profile timed out; using defaults");
            ServerProfile::default()
        }
    };

    tracing::info!(
        %run_id,
        engine = %catalog.engine,
        standard = %catalog.standard,
        checks = catalog.len(),
        multitenant = profile.multitenant,
        "Starting audit run"
    );

    let mut results = Vec::with_capacity(catalog.len());
    for check in &catalog.checks {
        if options.cancel.is_cancelled() {
            return Err(RunError::Cancelled {
                completed: results.len(),
            });
        }
        if options.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RunError::DeadlineExceeded {
                completed: results.len(),
            });
        }

        let result = run_check(conn, check, profile.multitenant, options).await;
        tracing::debug!(
            %run_id,
            check_id = %result.check_id,
            status = %result.status,
            "Check evaluated"
        );
        results.push(result);
    }

    let run = AuditRun {
        id: run_id,
        engine: catalog.engine,
        standard: catalog.standard.clone(),
        catalog_version: catalog.version.clone(),
        target,
        profile,
        started_at,
        finished_at: Utc::now(),
        results,
    };

    let counts = run.counts();
    tracing::info!(
        %run_id,
        passed = counts.passed,
        failed = counts.failed,
        manual = counts.manual,
        no_permission = counts.no_permission,
        error = counts.error,
        "Audit run completed"
    );

    Ok(run)
}

/// Evaluate one check. Never fails: every outcome is a status.
async fn run_check<C: Connection>(
    conn: &mut C,
    check: &CheckDefinition,
    multitenant: bool,
    options: &RunOptions,
) -> CheckResult {
    if check.classification.is_manual() {
        return CheckResult::new(check, CheckStatus::Manual);
    }
    let Some(predicate) = &check.predicate else {
        return CheckResult::new(check, CheckStatus::Manual)
            .with_detail("no automated predicate defined");
    };

    let mut observed = None;
    for statement in check.queries_for(multitenant) {
        let rows = match tokio::time::timeout(options.query_timeout, conn.query(statement)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return query_failure(check, e, options.error_policy),
            Err(_) => {
                return query_failure(
                    check,
                    QueryError::TimedOut(options.query_timeout),
                    options.error_policy,
                )
            }
        };

        let verdict = evaluation::evaluate(predicate, &rows);
        observed = verdict.observed;
        if !verdict.passed {
            return CheckResult::new(check, CheckStatus::Failed).with_observed(observed);
        }
    }

    CheckResult::new(check, CheckStatus::Passed).with_observed(observed)
}

fn query_failure(check: &CheckDefinition, err: QueryError, policy: QueryErrorPolicy) -> CheckResult {
    if err.is_permission() {
        return CheckResult::new(check, CheckStatus::NoPermission).with_detail(err.to_string());
    }

    // Logged loudly so a genuine catalog bug is not hidden behind No Permission.
    tracing::warn!(check_id = %check.id, error = %err, ?policy, "Check query failed");
    let status = match policy {
        QueryErrorPolicy::NoPermission => CheckStatus::NoPermission,
        QueryErrorPolicy::CheckError => CheckStatus::Error,
    };
    CheckResult::new(check, status).with_detail(err.to_string())
}
