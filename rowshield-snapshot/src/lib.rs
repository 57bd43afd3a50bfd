//! # rowshield-snapshot
//!
//! Durable probe matrices and regression detection.
//!
//! A snapshot flattens a run's results into
//! `table -> scenario -> operation -> outcome` and persists it as
//! versioned, ordered JSON. Diffing a previous snapshot against a current
//! one classifies every changed cell:
//!
//! - `DENY` became `ALLOW`: a **leak**, the finding that sets the exit
//!   signal,
//! - any other change: a **regression** (informational),
//! - a cell with no previous value: **newly introduced**.
//!
//! Key order survives the round-trip, so two snapshots of the same
//! database diff cleanly under plain text tooling too.

pub mod diff;
pub mod error;
pub mod file;
pub mod snapshot;

// Re-exports
pub use diff::{DiffEntry, SnapshotDiff, diff};
pub use error::{SnapshotError, SnapshotResult};
pub use file::SnapshotStore;
pub use snapshot::{PolicySnapshot, RecordedOutcome, SNAPSHOT_VERSION};
