//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(rowshield::io))]
    Io(#[from] std::io::Error),

    /// Policy file error
    #[error("Policy file error: {0}")]
    #[diagnostic(
        code(rowshield::config),
        help("check the policy file against `rowshield init` output")
    )]
    Config(String),

    /// Connection or privilege error
    #[error("Database error: {0}")]
    #[diagnostic(code(rowshield::database))]
    Database(String),

    /// Catalog discovery error
    #[error("Discovery error: {0}")]
    #[diagnostic(code(rowshield::discovery))]
    Discovery(String),

    /// Probe run error
    #[error("Probe run error: {0}")]
    #[diagnostic(code(rowshield::probe))]
    Probe(String),

    /// Snapshot file error
    #[error("Snapshot error: {0}")]
    #[diagnostic(code(rowshield::snapshot))]
    Snapshot(String),

    /// Command usage error
    #[error("{0}")]
    #[diagnostic(code(rowshield::command))]
    Command(String),
}

impl From<rowshield_config::ConfigError> for CliError {
    fn from(err: rowshield_config::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<rowshield_postgres::PgError> for CliError {
    fn from(err: rowshield_postgres::PgError) -> Self {
        CliError::Database(err.to_string())
    }
}

impl From<rowshield_audit::AuditError> for CliError {
    fn from(err: rowshield_audit::AuditError) -> Self {
        CliError::Discovery(err.to_string())
    }
}

impl From<rowshield_probe::ProbeError> for CliError {
    fn from(err: rowshield_probe::ProbeError) -> Self {
        CliError::Probe(err.to_string())
    }
}

impl From<rowshield_snapshot::SnapshotError> for CliError {
    fn from(err: rowshield_snapshot::SnapshotError) -> Self {
        CliError::Snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Command(format!("failed to serialize output: {}", err))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Config(format!("failed to serialize policy file: {}", err))
    }
}
