use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::runner::QueryErrorPolicy;

/// Configuration error raised for values that cannot fall back to a default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub catalog_dir: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub query_error_policy: QueryErrorPolicy,
    pub mssql_trust_server_certificate: bool,
    pub tls: Option<TlsConfig>,
    pub max_request_bytes: usize,
}

/// Certificate and key for serving HTTPS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            frontend_url: "http://localhost:3000".to_string(),
            catalog_dir: None,
            connect_timeout_secs: 15,
            query_timeout_secs: 30,
            run_timeout_secs: 600,
            query_error_policy: QueryErrorPolicy::default(),
            mssql_trust_server_certificate: true,
            tls: None,
            max_request_bytes: 64 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let query_error_policy = match env::var("AUDIT_QUERY_ERROR_POLICY") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "AUDIT_QUERY_ERROR_POLICY",
                value,
            })?,
            Err(_) => defaults.query_error_policy,
        };

        let tls = match (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (Err(_), Err(_)) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            host: env::var("BACKEND_HOST").unwrap_or(defaults.host),
            port: parse_or("BACKEND_PORT", defaults.port),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            catalog_dir: env::var("CATALOG_DIR").ok().map(PathBuf::from),
            connect_timeout_secs: parse_or(
                "AUDIT_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            query_timeout_secs: parse_or("AUDIT_QUERY_TIMEOUT_SECS", defaults.query_timeout_secs),
            run_timeout_secs: parse_or("AUDIT_RUN_TIMEOUT_SECS", defaults.run_timeout_secs),
            query_error_policy,
            mssql_trust_server_certificate: parse_or(
                "MSSQL_TRUST_SERVER_CERTIFICATE",
                defaults.mssql_trust_server_certificate,
            ),
            tls,
            max_request_bytes: parse_or("MAX_REQUEST_BYTES", defaults.max_request_bytes),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
