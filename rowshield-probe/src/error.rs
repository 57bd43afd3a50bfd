//! Error types for the run-level machinery.
//!
//! Note the asymmetry: the probe engine itself never returns these — every
//! failure inside a probe becomes a [`crate::ProbeOutcome`]. The
//! orchestrator and real-user lookup do propagate, because a run cannot
//! proceed without a catalog or a resolvable user.

use thiserror::Error;

/// Result type alias for run-level operations.
pub type ProbeRunResult<T> = Result<T, ProbeError>;

/// Errors that abort a run (as opposed to failing one probe).
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Connection-layer failure outside any probe.
    #[error(transparent)]
    Pg(#[from] rowshield_postgres::PgError),

    /// Catalog discovery failure.
    #[error(transparent)]
    Audit(#[from] rowshield_audit::AuditError),

    /// Real-user mode could not resolve the requested user.
    #[error("no auth.users record matches '{0}' (tried email, then id)")]
    UserNotFound(String),
}
