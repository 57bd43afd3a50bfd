//! # rowshield-probe
//!
//! The probe engine and everything scheduled around it.
//!
//! A probe answers one question: *under JWT claims C, can session role R
//! perform operation O on relation T?* The engine answers it by actually
//! trying, inside a transaction that is always rolled back:
//!
//! ```text
//! BEGIN
//!   set_config('request.jwt.claims', <claims json>, true)
//!   SET LOCAL ROLE anon | authenticated
//!   [set_config('role', <custom role>, true)]
//!   SAVEPOINT test_probe
//!     <attempt the operation>
//!   ROLLBACK TO SAVEPOINT test_probe
//! ROLLBACK
//! ```
//!
//! Both rollbacks run even when the attempt succeeds. Either one alone
//! guarantees nothing persists; issuing both defends the containment
//! invariant against driver- or SQL-level surprises.
//!
//! The engine classifies every attempt as ALLOW, DENY, ERROR or SKIPPED
//! and never raises: a server-reported error is a classification input, a
//! lost connection is an ERROR outcome. The [`orchestrator`] fans probes
//! out across per-table tasks with bounded parallelism, the [`coverage`]
//! builder projects results into a per-table access matrix, and
//! [`realuser`] lets a run impersonate an actual `auth.users` record.

pub mod coverage;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod realuser;
pub mod results;
pub mod values;

// Re-exports
pub use coverage::{AccessMatrix, CoverageReport, TableCoverage};
pub use engine::{ProbeEngine, ProbeObservation, ProbeTarget};
pub use error::{ProbeError, ProbeRunResult};
pub use orchestrator::{CancelFlag, Orchestrator};
pub use outcome::{OutcomeKind, ProbeOutcome};
pub use results::{TestResult, TestResults};
