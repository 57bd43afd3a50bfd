//! Error types for policy-plan loading and validation.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating a policy plan.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The policy file could not be parsed.
    #[error("failed to parse policy file: {0}")]
    Parse(String),

    /// The same table key appears more than once in the plan.
    #[error("duplicate table key '{0}' in policy file")]
    DuplicateTable(String),

    /// The same storage bucket appears more than once in the plan.
    #[error("duplicate storage bucket '{0}' in policy file")]
    DuplicateBucket(String),

    /// A table key is not `name` or `schema.name` shaped.
    #[error("invalid table key '{0}': expected 'name' or 'schema.name'")]
    InvalidTableKey(String),

    /// An operation name outside SELECT/INSERT/UPDATE/DELETE.
    #[error("unknown operation '{0}': expected SELECT, INSERT, UPDATE or DELETE")]
    UnknownOperation(String),

    /// Plan-level validation failure.
    #[error("invalid policy plan: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_offender() {
        let err = ConfigError::DuplicateTable("public.todos".to_string());
        assert!(err.to_string().contains("public.todos"));

        let err = ConfigError::UnknownOperation("TRUNCATE".to_string());
        assert!(err.to_string().contains("TRUNCATE"));
    }
}
