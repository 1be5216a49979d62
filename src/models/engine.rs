//! Supported target database engines.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Oracle,
    #[serde(alias = "sqlserver")]
    Mssql,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl EngineType {
    pub const ALL: [EngineType; 3] = [Self::Oracle, Self::Mssql, Self::Postgres];

    /// Canonical lowercase key used in catalog paths and URLs.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Mssql => "mssql",
            Self::Postgres => "postgres",
        }
    }

    /// Display name used in reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Oracle => "Oracle Database",
            Self::Mssql => "Microsoft SQL Server",
            Self::Postgres => "PostgreSQL",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Oracle => 1521,
            Self::Mssql => 1433,
            Self::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Error returned when an engine string names no supported engine.
#[derive(Debug, thiserror::Error)]
#[error("unsupported database type '{0}'. Supported: oracle, mssql, postgres")]
pub struct UnknownEngine(pub String);

impl FromStr for EngineType {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oracle" => Ok(Self::Oracle),
            "mssql" | "sqlserver" => Ok(Self::Mssql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}
