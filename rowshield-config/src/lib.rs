//! # rowshield-config
//!
//! The declarative test-plan model for rowshield.
//!
//! A policy file declares, per table (and optionally per storage bucket),
//! the simulated callers to impersonate and the outcome each SQL operation
//! is expected to produce under their JWT claims. This crate owns:
//!
//! - the closed [`Op`] / [`Expectation`] vocabulary,
//! - the [`JwtClaims`] map surfaced to the database session,
//! - [`Scenario`] and the [`PolicyConfig`] plan structure,
//! - the YAML/JSON loader with load-time validation (duplicate table keys
//!   and unknown operations are rejected before anything touches a
//!   database),
//! - the [`RunOptions`] the orchestrator consumes.
//!
//! Everything here is immutable input: once a run starts, the plan is
//! read-only.

pub mod claims;
pub mod error;
pub mod op;
pub mod options;
pub mod policy;
pub mod scenario;

// Re-exports
pub use claims::JwtClaims;
pub use error::{ConfigError, ConfigResult};
pub use op::{Expectation, Op};
pub use options::{RunOptions, DEFAULT_PARALLELISM, MAX_PARALLELISM, MIN_PARALLELISM};
pub use policy::{
    BucketPlan, Defaults, DefaultJwtClaims, PolicyConfig, TableKey, TablePlan,
};
pub use scenario::Scenario;
