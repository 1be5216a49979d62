//! Oracle adapter on the `oracle` crate (ODPI-C).
//!
//! The driver is blocking, so every call runs on tokio's blocking pool. The
//! session is shared with each task through an `Arc`: a caller that stops
//! waiting (query timeout, cancelled request) never takes the session away
//! from the checks that follow.

use std::sync::Arc;

use async_trait::async_trait;

use super::{guard, scalar, ConnectError, ConnectOptions, Connection, QueryError, RowSet};
use crate::models::audit::ServerProfile;
use crate::models::request::Credentials;

/// ORA-01031 insufficient privileges, ORA-00942 table or view does not exist
/// (dictionary views are hidden from accounts without grants), ORA-01039
/// insufficient privileges on underlying objects of the view.
const PERMISSION_ERRORS: [i32; 3] = [1031, 942, 1039];

/// ORA-03113/03114/03135: lost contact with the server.
const DISCONNECT_ERRORS: [i32; 3] = [3113, 3114, 3135];

/// ORA-01017 invalid credentials, ORA-28000 account locked, ORA-28001 password
/// expired, ORA-01045 missing CREATE SESSION.
const LOGIN_ERRORS: [i32; 4] = [1017, 28000, 28001, 1045];

/// A blocking session shared with the blocking-pool tasks that use it.
struct Shared<S> {
    inner: Option<Arc<S>>,
}

impl<S: Send + Sync + 'static> Shared<S> {
    fn new(session: S) -> Self {
        Self {
            inner: Some(Arc::new(session)),
        }
    }

    /// Run `f` against the session on the blocking pool.
    ///
    /// Dropping the returned future leaves the session in place; the task
    /// keeps its own handle until the driver call returns.
    async fn call<T, F>(&self, f: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, QueryError> + Send + 'static,
    {
        let session = self.inner.clone().ok_or(QueryError::Closed)?;
        tokio::task::spawn_blocking(move || f(&session))
            .await
            .map_err(|e| QueryError::Engine(format!("driver task failed: {e}")))?
    }

    fn take(&mut self) -> Option<Arc<S>> {
        self.inner.take()
    }
}

pub struct OracleConnection {
    session: Shared<oracle::Connection>,
}

impl OracleConnection {
    pub async fn connect(
        credentials: &Credentials,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectError> {
        let username = credentials.username.clone();
        let password = credentials.password.clone();
        let connect_string = format!(
            "//{}:{}/{}",
            credentials.host, credentials.port, credentials.database
        );
        let call_timeout = options.statement_timeout;

        let task = tokio::task::spawn_blocking(move || {
            let conn = oracle::Connection::connect(&username, password.expose(), &connect_string)?;
            conn.set_call_timeout(Some(call_timeout))?;
            Ok::<_, oracle::Error>(conn)
        });

        match tokio::time::timeout(options.connect_timeout, task).await {
            Err(_) => Err(ConnectError::TimedOut(options.connect_timeout)),
            Ok(Err(join)) => Err(ConnectError::Driver(format!("connect task failed: {join}"))),
            Ok(Ok(Err(e))) => Err(classify_connect_error(credentials, e)),
            Ok(Ok(Ok(conn))) => Ok(Self {
                session: Shared::new(conn),
            }),
        }
    }
}

#[async_trait]
impl Connection for OracleConnection {
    async fn profile(&mut self) -> Result<ServerProfile, QueryError> {
        let version = self
            .session
            .call(|conn: &oracle::Connection| {
                conn.server_version()
                    .map(|(_, banner)| banner)
                    .map_err(classify_query_error)
            })
            .await?;

        let multitenant = match scalar(self, "SELECT CDB FROM V$DATABASE").await {
            Ok(value) => value.is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            Err(e) => {
                tracing::debug!(error = %e, "Could not determine CDB status; assuming non-CDB");
                false
            }
        };

        Ok(ServerProfile {
            version: Some(version),
            multitenant,
        })
    }

    async fn query(&mut self, statement: &str) -> Result<RowSet, QueryError> {
        guard::ensure_read_only(statement)?;

        // OCI rejects a trailing terminator
        let sql = statement.trim().trim_end_matches(';').to_string();
        self.session
            .call(move |conn: &oracle::Connection| run_query(conn, &sql))
            .await
    }

    async fn close(mut self) {
        let Some(conn) = self.session.take() else {
            return;
        };
        let closed = tokio::task::spawn_blocking(move || conn.close()).await;
        if let Ok(Err(e)) = closed {
            tracing::debug!(error = %e, "Oracle connection closed uncleanly");
        }
    }
}

impl Drop for OracleConnection {
    // OCI session release blocks; keep it off the async workers.
    fn drop(&mut self) {
        let Some(conn) = self.session.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn_blocking(move || drop(conn));
        }
    }
}

fn run_query(conn: &oracle::Connection, sql: &str) -> Result<RowSet, QueryError> {
    let result_set = conn.query(sql, &[]).map_err(classify_query_error)?;

    let columns: Vec<String> = result_set
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in result_set {
        let row = row.map_err(classify_query_error)?;
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let cell: Option<String> = row.get(idx).map_err(classify_query_error)?;
            cells.push(cell);
        }
        rows.push(cells);
    }

    Ok(RowSet::new(columns, rows))
}

fn ora_code(err: &oracle::Error) -> Option<i32> {
    err.db_error().map(|db| db.code())
}

fn classify_connect_error(credentials: &Credentials, err: oracle::Error) -> ConnectError {
    match ora_code(&err) {
        Some(code) if LOGIN_ERRORS.contains(&code) => ConnectError::Rejected(err.to_string()),
        // ORA-12xxx: listener, naming and network-layer errors
        Some(code) if (12000..13000).contains(&code) => ConnectError::Unreachable {
            host: credentials.host.clone(),
            port: credentials.port,
            reason: err.to_string(),
        },
        Some(_) => ConnectError::Rejected(err.to_string()),
        None => ConnectError::Driver(err.to_string()),
    }
}

fn classify_query_error(err: oracle::Error) -> QueryError {
    ora_error(ora_code(&err), err.to_string())
}

fn ora_error(code: Option<i32>, message: String) -> QueryError {
    match code {
        Some(code) if PERMISSION_ERRORS.contains(&code) => QueryError::Permission(message),
        Some(code) if DISCONNECT_ERRORS.contains(&code) => QueryError::Closed,
        _ => QueryError::Engine(message),
    }
}
