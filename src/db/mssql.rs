//! SQL Server adapter on `tiberius` over a tokio TCP stream.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{guard, scalar, ConnectError, ConnectOptions, Connection, QueryError, RowSet};
use crate::models::audit::ServerProfile;
use crate::models::request::Credentials;

/// Server error numbers that signal missing grants (229/230 object and column
/// permission, 262 statement permission, 297/300 server-state permission,
/// 916 database access, 15247 procedure permission).
const PERMISSION_ERRORS: [u32; 7] = [229, 230, 262, 297, 300, 916, 15247];

/// Login failed, database unavailable, or login-time permission denied.
const LOGIN_ERRORS: [u32; 4] = [18456, 4060, 18452, 18470];

pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
}

impl MssqlConnection {
    pub async fn connect(
        credentials: &Credentials,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectError> {
        let mut config = Config::new();
        config.host(&credentials.host);
        config.port(credentials.port);
        config.database(&credentials.database);
        config.application_name("auditix");
        config.authentication(AuthMethod::sql_server(
            &credentials.username,
            credentials.password.expose(),
        ));
        config.encryption(EncryptionLevel::Required);
        if options.trust_server_certificate {
            config.trust_cert();
        }

        let connect = async move {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| ConnectError::Unreachable {
                    host: credentials.host.clone(),
                    port: credentials.port,
                    reason: e.to_string(),
                })?;
            tcp.set_nodelay(true)
                .map_err(|e| ConnectError::InvalidParameters(e.to_string()))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| classify_connect_error(credentials, e))
        };

        match tokio::time::timeout(options.connect_timeout, connect).await {
            Err(_) => Err(ConnectError::TimedOut(options.connect_timeout)),
            Ok(result) => Ok(Self { client: result? }),
        }
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn profile(&mut self) -> Result<ServerProfile, QueryError> {
        let version = scalar(self, "SELECT @@VERSION").await?;
        Ok(ServerProfile {
            // first line of the banner carries edition and build
            version: version.map(|v| v.lines().next().unwrap_or_default().trim().to_string()),
            multitenant: false,
        })
    }

    async fn query(&mut self, statement: &str) -> Result<RowSet, QueryError> {
        guard::ensure_read_only(statement)?;

        let stream = self
            .client
            .simple_query(statement)
            .await
            .map_err(classify_query_error)?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(classify_query_error)?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let values = rows
            .into_iter()
            .map(|row| row.into_iter().map(render_cell).collect())
            .collect();

        Ok(RowSet::new(columns, values))
    }

    async fn close(self) {
        if let Err(e) = self.client.close().await {
            tracing::debug!(error = %e, "SQL Server connection closed uncleanly");
        }
    }
}

/// Render a TDS value as text; NULLs of every type become `None`.
fn render_cell(data: ColumnData<'static>) -> Option<String> {
    match data {
        ColumnData::U8(v) => v.map(|n| n.to_string()),
        ColumnData::I16(v) => v.map(|n| n.to_string()),
        ColumnData::I32(v) => v.map(|n| n.to_string()),
        ColumnData::I64(v) => v.map(|n| n.to_string()),
        ColumnData::F32(v) => v.map(|n| n.to_string()),
        ColumnData::F64(v) => v.map(|n| n.to_string()),
        ColumnData::Bit(v) => v.map(|b| if b { "1" } else { "0" }.to_string()),
        ColumnData::String(v) => v.map(|s| s.into_owned()),
        ColumnData::Guid(v) => v.map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()),
        ColumnData::Binary(v) => v.map(|b| format!("0x{}", hex::encode_upper(b.as_ref()))),
        other => Some(format!("{other:?}")),
    }
}

fn classify_connect_error(credentials: &Credentials, err: tiberius::error::Error) -> ConnectError {
    match err {
        tiberius::error::Error::Server(token) if LOGIN_ERRORS.contains(&token.code()) => {
            ConnectError::Rejected(token.message().to_string())
        }
        tiberius::error::Error::Io { message, .. } => ConnectError::Unreachable {
            host: credentials.host.clone(),
            port: credentials.port,
            reason: message,
        },
        tiberius::error::Error::Tls(message) => ConnectError::Unreachable {
            host: credentials.host.clone(),
            port: credentials.port,
            reason: format!("TLS negotiation failed: {message}"),
        },
        other => ConnectError::Driver(other.to_string()),
    }
}

fn classify_query_error(err: tiberius::error::Error) -> QueryError {
    match err {
        tiberius::error::Error::Server(token) => server_error(token.code(), token.message()),
        tiberius::error::Error::Io { .. } => QueryError::Closed,
        other => QueryError::Engine(other.to_string()),
    }
}

fn server_error(code: u32, message: &str) -> QueryError {
    if PERMISSION_ERRORS.contains(&code) {
        QueryError::Permission(message.to_string())
    } else {
        QueryError::Engine(format!("{message} (error {code})"))
    }
}
