//! # rowshield-postgres
//!
//! The connection layer rowshield probes through.
//!
//! This crate owns three things:
//!
//! - [`PgConfig`]: connection-string parsing (`postgres://` URLs) with the
//!   knobs a probing run cares about (connect timeout, application name,
//!   sslmode),
//! - [`PgPool`] / [`PgConnection`] / [`PgTransaction`]: a deadpool-backed
//!   pool whose capacity equals the run's parallelism, and a thin query
//!   surface with explicit transaction and savepoint control — the probe
//!   engine's containment protocol is built on exactly these primitives,
//! - [`ConnectionContext`]: the privilege gatekeeper. It profiles the
//!   logged-in role once at startup and refuses to proceed when the role
//!   could bypass RLS (superuser), escape containment (CREATE), or mutate
//!   catalogs at will (global DML). A safe probing run is impossible on
//!   such a role, so the rejection is fatal by design.

pub mod config;
pub mod connection;
pub mod error;
pub mod gatekeeper;
pub mod pool;

// Re-exports
pub use config::{PgConfig, SslMode};
pub use connection::{PgConnection, PgTransaction};
pub use error::{PgError, PgResult};
pub use gatekeeper::{ConnectionContext, PrivilegeProfile, TableGrant};
pub use pool::PgPool;
