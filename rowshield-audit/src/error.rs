//! Error types for discovery and analysis.

use thiserror::Error;

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that can occur during catalog discovery or analysis.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Connection-layer failure.
    #[error(transparent)]
    Pg(#[from] rowshield_postgres::PgError),

    /// A catalog query returned something unusable.
    #[error("catalog query error: {0}")]
    Catalog(String),
}

impl AuditError {
    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }
}
