//! PostgreSQL adapter built on a single `sqlx` connection.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Column, ConnectOptions as _, Connection as _, Executor as _, Row};

use super::{guard, scalar, ConnectError, ConnectOptions, Connection, QueryError, RowSet};
use crate::models::audit::ServerProfile;
use crate::models::request::Credentials;

/// SQLSTATE 42501 insufficient_privilege.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// SQLSTATE classes raised by the server while authenticating.
const LOGIN_FAILURE_CLASSES: [&str; 2] = ["28", "3D"];

pub struct PostgresConnection {
    inner: PgConnection,
}

impl PostgresConnection {
    pub async fn connect(
        credentials: &Credentials,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectError> {
        let connect_options = PgConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.username)
            .password(credentials.password.expose())
            .database(&credentials.database)
            .ssl_mode(PgSslMode::Prefer)
            .application_name("auditix")
            .disable_statement_logging();

        let mut inner =
            match tokio::time::timeout(options.connect_timeout, connect_options.connect()).await {
                Err(_) => return Err(ConnectError::TimedOut(options.connect_timeout)),
                Ok(Err(e)) => return Err(classify_connect_error(credentials, e)),
                Ok(Ok(conn)) => conn,
            };

        // Belt and braces on top of the statement guard.
        let session_setup = format!(
            "SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY; SET statement_timeout = {}",
            options.statement_timeout.as_millis()
        );
        (&mut inner)
            .execute(sqlx::raw_sql(&session_setup))
            .await
            .map_err(|e| ConnectError::Rejected(format!("session setup failed: {e}")))?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn profile(&mut self) -> Result<ServerProfile, QueryError> {
        let version = scalar(self, "SHOW server_version").await?;
        Ok(ServerProfile {
            version: version.map(|v| format!("PostgreSQL {v}")),
            multitenant: false,
        })
    }

    async fn query(&mut self, statement: &str) -> Result<RowSet, QueryError> {
        guard::ensure_read_only(statement)?;

        // Simple-query protocol: every value arrives in text format.
        let rows = (&mut self.inner)
            .fetch_all(sqlx::raw_sql(statement))
            .await
            .map_err(classify_query_error)?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                let cell: Option<String> = row
                    .try_get_unchecked(idx)
                    .map_err(|e| QueryError::Engine(format!("column {idx}: {e}")))?;
                cells.push(cell);
            }
            values.push(cells);
        }

        Ok(RowSet::new(columns, values))
    }

    async fn close(self) {
        if let Err(e) = self.inner.close().await {
            tracing::debug!(error = %e, "PostgreSQL connection closed uncleanly");
        }
    }
}

fn classify_connect_error(credentials: &Credentials, err: sqlx::Error) -> ConnectError {
    match err {
        sqlx::Error::Io(e) => ConnectError::Unreachable {
            host: credentials.host.clone(),
            port: credentials.port,
            reason: e.to_string(),
        },
        sqlx::Error::Tls(e) => ConnectError::Unreachable {
            host: credentials.host.clone(),
            port: credentials.port,
            reason: format!("TLS negotiation failed: {e}"),
        },
        sqlx::Error::Configuration(e) => ConnectError::InvalidParameters(e.to_string()),
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|c| LOGIN_FAILURE_CLASSES.iter().any(|class| c.starts_with(class))) =>
        {
            ConnectError::Rejected(db.message().to_string())
        }
        other => ConnectError::Driver(other.to_string()),
    }
}

fn classify_query_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::Database(db) => sqlstate_error(db.code().as_deref(), db.message()),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            QueryError::Closed
        }
        other => QueryError::Engine(other.to_string()),
    }
}

fn sqlstate_error(code: Option<&str>, message: &str) -> QueryError {
    match code {
        Some(INSUFFICIENT_PRIVILEGE) => QueryError::Permission(message.to_string()),
        Some(code) => QueryError::Engine(format!("{message} (SQLSTATE {code})")),
        None => QueryError::Engine(message.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failures_mark_connection_closed() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(classify_query_error(err), QueryError::Closed));
    }

    #[test]
    fn sqlstate_classification() {
        let cases = [
            (Some("42501"), true),
            (Some("42P01"), false),
            (Some("42703"), false),
            (Some("25006"), false),
            (None, false),
        ];
        for (code, permission) in cases {
            let err = sqlstate_error(code, "permission denied for view pg_hba_file_rules");
            assert_eq!(err.is_permission(), permission, "{code:?}");
        }
        let err = sqlstate_error(Some("42P01"), "relation \"x\" does not exist");
        assert!(err.to_string().contains("SQLSTATE 42P01"));
    }

    #[test]
    fn unreachable_host_reports_target_without_password() {
        let credentials = Credentials {
            engine: crate::models::engine::EngineType::Postgres,
            host: "db.internal".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "auditor".to_string(),
            password: crate::models::request::Password::new("hunter2"),
        };
        let err = classify_connect_error(
            &credentials,
            sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
        );
        let message = err.to_string();
        assert!(message.contains("db.internal:5432"));
        assert!(!message.contains("hunter2"));
    }
}
