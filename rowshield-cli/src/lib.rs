//! # rowshield-cli
//!
//! The terminal surface over the rowshield core crates: argument parsing,
//! command dispatch, colored presentation, and exit-code plumbing. All
//! behavior lives in the core crates; this one only connects, runs, and
//! renders.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use error::{CliError, CliResult};
