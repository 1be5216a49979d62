//! Audit request DTO and the validated connection credentials it yields.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::models::audit::ReportFormat;
use crate::models::engine::EngineType;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#.@\\-]{0,127}$").expect("valid regex"));

static DATABASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_$#.\-]{1,128}$").expect("valid regex"));

static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.\-:\[\]]{1,253}$").expect("valid regex"));

pub const DEFAULT_STANDARD: &str = "CIS";

/// A password that never appears in `Debug` output.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

// Validation errors carry the field value; only the mask ever leaves.
impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Incoming audit request, from the HTML form or the JSON API.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuditRequest {
    pub db_type: String,
    #[validate(custom(function = "validate_host"))]
    pub host: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(range(min = 1))]
    pub port: Option<u16>,
    #[validate(custom(function = "validate_database"))]
    pub database: String,
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(custom(function = "validate_password"))]
    pub password: Password,
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Connection parameters for one audit. Never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub engine: EngineType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Password,
}

impl Credentials {
    /// Human-readable target description without the password.
    pub fn target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// A request that passed validation, split into what the audit needs.
#[derive(Debug, Clone)]
pub struct ValidatedAudit {
    pub credentials: Credentials,
    pub standard: String,
    pub format: ReportFormat,
}

impl AuditRequest {
    /// Validate field shapes and resolve the engine, standard and format.
    pub fn into_validated(self) -> Result<ValidatedAudit, AppError> {
        self.validate()?;

        let engine: EngineType = self
            .db_type
            .parse()
            .map_err(|e: crate::models::engine::UnknownEngine| AppError::Validation(e.to_string()))?;

        let format = match self.format.as_deref().map(str::trim) {
            None | Some("") => ReportFormat::default(),
            Some(f) => f.parse().map_err(AppError::Validation)?,
        };

        let standard = self
            .standard
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STANDARD.to_string());

        Ok(ValidatedAudit {
            credentials: Credentials {
                engine,
                port: self.port.unwrap_or_else(|| engine.default_port()),
                host: self.host,
                database: self.database,
                username: self.username,
                password: self.password,
            },
            standard,
            format,
        })
    }
}

fn validate_host(host: &str) -> Result<(), ValidationError> {
    if HOST_RE.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_host"))
    }
}

fn validate_database(database: &str) -> Result<(), ValidationError> {
    if DATABASE_RE.is_match(database) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_database"))
    }
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username"))
    }
}

fn validate_password(password: &Password) -> Result<(), ValidationError> {
    let value = password.expose();
    if value.is_empty() || value.len() > 256 || value.chars().any(char::is_control) {
        return Err(ValidationError::new("invalid_password"));
    }
    Ok(())
}

/// HTML forms submit empty strings for blank optional fields.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> AuditRequest {
        serde_json::from_value(json!({
            "db_type": "postgres",
            "host": "db.internal",
            "database": "appdb",
            "username": "auditor",
            "password": "s3cret!"
        }))
        .unwrap()
    }

    #[test]
    fn valid_request_fills_defaults() {
        let audit = request().into_validated().unwrap();
        assert_eq!(audit.credentials.engine, EngineType::Postgres);
        assert_eq!(audit.credentials.port, 5432);
        assert_eq!(audit.standard, "CIS");
        assert_eq!(audit.format, ReportFormat::Html);
    }

    #[test]
    fn unknown_engine_is_validation_error() {
        let mut req = request();
        req.db_type = "db2".to_string();
        let err = req.into_validated().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn username_whitelist_rejects_injection() {
        let mut req = request();
        req.username = "admin'; --".to_string();
        assert!(matches!(req.into_validated(), Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_password_rejected() {
        let mut req = request();
        req.password = Password::new("");
        assert!(matches!(req.into_validated(), Err(AppError::Validation(_))));
    }

    #[test]
    fn port_accepts_blank_and_text_forms() {
        let req: AuditRequest = serde_json::from_value(json!({
            "db_type": "oracle",
            "host": "10.0.0.5",
            "port": "",
            "database": "ORCLPDB1",
            "username": "C##AUDIT",
            "password": "pw"
        }))
        .unwrap();
        assert_eq!(req.port, None);

        let req: AuditRequest = serde_json::from_value(json!({
            "db_type": "oracle",
            "host": "10.0.0.5",
            "port": "1522",
            "database": "ORCLPDB1",
            "username": "C##AUDIT",
            "password": "pw"
        }))
        .unwrap();
        assert_eq!(req.port, Some(1522));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let audit = request().into_validated().unwrap();
        let rendered = format!("{:?}", audit.credentials);
        assert!(!rendered.contains("s3cret!"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn password_serializes_masked() {
        let password = Password::new("s3cret!");
        assert_eq!(serde_json::to_value(&password).unwrap(), json!("***"));

        let mut req = request();
        req.password = Password::new("bad\u{7}pw");
        let errors = req.validate().unwrap_err();
        let rendered = serde_json::to_string(&errors).unwrap();
        assert!(!rendered.contains("bad"));
    }

    #[test]
    fn target_omits_password() {
        let audit = request().into_validated().unwrap();
        assert_eq!(audit.credentials.target(), "auditor@db.internal:5432/appdb");
    }
}
