//! # rowshield-audit
//!
//! Catalog discovery and static policy analysis.
//!
//! The [`Introspector`] trait (with [`PgIntrospector`] as the live
//! implementation) enumerates what a database actually has: base tables
//! with their RLS flags, the policies attached to them, Supabase storage
//! buckets, and the column grants held by the public-facing roles. The
//! [`linter`] runs each discovered policy expression through a fixed set of
//! conservative textual checks, and the [`sensitive`] scanner flags
//! secret-shaped columns readable by `anon`/`authenticated`/`PUBLIC`.
//!
//! Discovery failures propagate — a run cannot continue without a catalog.
//! Lint checks never execute policy expressions; they are trim-and-compare
//! by design so a complex expression can never be misjudged, only left
//! unflagged.

pub mod error;
pub mod introspect;
pub mod linter;
pub mod report;
pub mod sensitive;

// Re-exports
pub use error::{AuditError, AuditResult};
pub use introspect::{
    ColumnGrant, Discovery, IntrospectionWarning, Introspector, PgIntrospector, PolicyCommand,
    PolicyInfo, SchemaFilter, StorageBucketMeta, TableMeta, discover,
};
pub use linter::{CheckId, LintIssue, LintResults, Severity, lint_policies};
pub use report::AuditReport;
pub use sensitive::{SensitiveColumnScanner, DEFAULT_SENSITIVE_PATTERNS};
