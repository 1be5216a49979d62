//! Read-only database adapters for the audited targets.
//!
//! Each engine implements [`Connection`]; [`connect`] picks the implementation
//! from the engine type. Statements pass through [`guard::ensure_read_only`]
//! before they reach a driver.

pub mod guard;
pub mod mssql;
pub mod oracle;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::audit::ServerProfile;
use crate::models::engine::EngineType;
use crate::models::request::Credentials;

/// Rows returned by a query, every value rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Single-value row set, handy for scalar queries and tests.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self {
            columns: vec!["value".to_string()],
            rows: vec![vec![Some(value.into())]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of every row; NULL becomes the empty string.
    pub fn first_column(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(|row| row.first().and_then(|v| v.as_deref()).unwrap_or(""))
    }

    /// First column of the first row.
    pub fn first_value(&self) -> Option<&str> {
        self.first_column().next()
    }
}

/// Failure to establish a session with the target.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid connection parameters: {0}")]
    InvalidParameters(String),

    #[error("{host}:{port} is unreachable: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("connection attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("database driver error: {0}")]
    Driver(String),
}

/// Failure of a single statement.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    #[error("insufficient privilege: {0}")]
    Permission(String),

    #[error("statement refused by read-only guard: {0}")]
    Rejected(#[from] guard::GuardError),

    #[error("query failed: {0}")]
    Engine(String),

    #[error("query timed out after {0:?}")]
    TimedOut(Duration),

    #[error("connection is closed")]
    Closed,
}

impl QueryError {
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }
}

/// Session tuning applied when connecting.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
    pub trust_server_certificate: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            statement_timeout: Duration::from_secs(30),
            trust_server_certificate: true,
        }
    }
}

/// Uniform read-only interface over one live session.
///
/// A connection is used by exactly one audit run and is never shared. Methods
/// return boxed `Send` futures so the runner stays usable from axum handlers.
#[async_trait]
pub trait Connection: Send {
    /// Version banner and multi-tenant flag of the server.
    async fn profile(&mut self) -> Result<ServerProfile, QueryError>;

    /// Run one read-only statement.
    async fn query(&mut self, statement: &str) -> Result<RowSet, QueryError>;

    /// Release the session. Dropping a connection also releases it.
    async fn close(self)
    where
        Self: Sized;
}

/// A connection to any supported engine.
pub enum AnyConnection {
    Postgres(postgres::PostgresConnection),
    Mssql(mssql::MssqlConnection),
    Oracle(oracle::OracleConnection),
}

/// Open a session to the target described by `credentials`.
pub async fn connect(
    credentials: &Credentials,
    options: &ConnectOptions,
) -> Result<AnyConnection, ConnectError> {
    tracing::info!(
        engine = %credentials.engine,
        target = %credentials.target(),
        "Connecting to audit target"
    );

    let connection = match credentials.engine {
        EngineType::Postgres => {
            AnyConnection::Postgres(postgres::PostgresConnection::connect(credentials, options).await?)
        }
        EngineType::Mssql => {
            AnyConnection::Mssql(mssql::MssqlConnection::connect(credentials, options).await?)
        }
        EngineType::Oracle => {
            AnyConnection::Oracle(oracle::OracleConnection::connect(credentials, options).await?)
        }
    };

    Ok(connection)
}

#[async_trait]
impl Connection for AnyConnection {
    async fn profile(&mut self) -> Result<ServerProfile, QueryError> {
        match self {
            Self::Postgres(c) => c.profile().await,
            Self::Mssql(c) => c.profile().await,
            Self::Oracle(c) => c.profile().await,
        }
    }

    async fn query(&mut self, statement: &str) -> Result<RowSet, QueryError> {
        match self {
            Self::Postgres(c) => c.query(statement).await,
            Self::Mssql(c) => c.query(statement).await,
            Self::Oracle(c) => c.query(statement).await,
        }
    }

    async fn close(self) {
        match self {
            Self::Postgres(c) => c.close().await,
            Self::Mssql(c) => c.close().await,
            Self::Oracle(c) => c.close().await,
        }
    }
}

/// Run a statement and return the first value of the first row, if any.
pub(crate) async fn scalar<C: Connection>(
    conn: &mut C,
    statement: &str,
) -> Result<Option<String>, QueryError> {
    let rows = conn.query(statement).await?;
    Ok(rows.first_value().map(str::to_string))
}
