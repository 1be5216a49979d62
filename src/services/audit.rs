//! Audit orchestration: validate, connect, run the catalog, render the report.

use std::time::Duration;

use tokio::time::Instant;

use crate::db::{self, ConnectOptions, Connection};
use crate::errors::AppError;
use crate::models::request::AuditRequest;
use crate::services::report::{self, Document};
use crate::services::runner::{self, RunOptions};
use crate::AppState;

/// Slack between the driver's statement timeout and the runner's own, so the
/// server-side timeout fires first and the session stays usable.
const DRIVER_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Run one audit end to end and return the rendered report.
///
/// Validation happens before any network activity. A connection failure or an
/// aborted run yields an error and no report.
pub async fn execute(state: &AppState, request: AuditRequest) -> Result<Document, AppError> {
    let audit = request.into_validated()?;
    let credentials = &audit.credentials;

    let catalog = state
        .catalogs
        .get(credentials.engine, &audit.standard)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "No '{}' catalog is available for {}",
                audit.standard,
                credentials.engine.display_name()
            ))
        })?;

    let config = &state.config;
    let connect_options = ConnectOptions {
        connect_timeout: config.connect_timeout(),
        statement_timeout: config.query_timeout(),
        trust_server_certificate: config.mssql_trust_server_certificate,
    };
    let run_options = RunOptions {
        query_timeout: config.query_timeout() + DRIVER_TIMEOUT_GRACE,
        deadline: Some(Instant::now() + config.run_timeout()),
        cancel: state.shutdown.child_token(),
        error_policy: config.query_error_policy,
    };

    let mut conn = db::connect(credentials, &connect_options).await?;
    let outcome = runner::run(&mut conn, catalog, credentials.target(), &run_options).await;
    conn.close().await;
    let run = outcome?;

    let counts = run.counts();
    tracing::info!(
        run_id = %run.id,
        engine = %run.engine,
        host = %credentials.host,
        standard = %run.standard,
        passed = counts.passed,
        failed = counts.failed,
        manual = counts.manual,
        no_permission = counts.no_permission,
        "Audit finished; rendering report"
    );

    report::render(&run, catalog, audit.format)
}
