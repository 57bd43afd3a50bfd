//! Error types for the connection layer.

use thiserror::Error;

/// Result type for connection-layer operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur while connecting, pooling, or querying.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error (acquisition, creation, timeout).
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL driver error. Carries the original cause, including any
    /// SQLSTATE the server reported.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection-string or pool configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server could not be reached (DNS, refused, timeout).
    #[error("connection error: {0}")]
    Connection(String),

    /// The logged-in role holds a privilege that makes safe probing
    /// impossible.
    #[error("role '{role}' is unsafe for probing: {privilege}")]
    UnsafeRole {
        /// The rejected role.
        role: String,
        /// The offending privilege, spelled out for the operator.
        privilege: String,
    },
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an unsafe-role rejection.
    pub fn unsafe_role(role: impl Into<String>, privilege: impl Into<String>) -> Self {
        Self::UnsafeRole {
            role: role.into(),
            privilege: privilege.into(),
        }
    }

    /// Whether this error means the database could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_))
    }

    /// Whether this is the gatekeeper's fatal privilege rejection.
    pub fn is_privilege_rejection(&self) -> bool {
        matches!(self, Self::UnsafeRole { .. })
    }
}
