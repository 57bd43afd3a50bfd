//! The closed SQL operation vocabulary and expected outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A probeable SQL operation.
///
/// The set is closed: every dispatch in the probe engine matches on it
/// exhaustively, so adding a variant is a compile-time event, not a string
/// comparison scattered across the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    /// Row visibility (`SELECT ... LIMIT 1`).
    Select,
    /// Row creation (synthesized minimal `INSERT`).
    Insert,
    /// Row mutation (no-op targeted `UPDATE`).
    Update,
    /// Row removal (targeted `DELETE`).
    Delete,
}

impl Op {
    /// All four operations in canonical order.
    pub const ALL: [Op; 4] = [Op::Select, Op::Insert, Op::Update, Op::Delete];

    /// The SQL keyword for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Select => "SELECT",
            Op::Insert => "INSERT",
            Op::Update => "UPDATE",
            Op::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Ok(Op::Select),
            "INSERT" => Ok(Op::Insert),
            "UPDATE" => Ok(Op::Update),
            "DELETE" => Ok(Op::Delete),
            other => Err(ConfigError::UnknownOperation(other.to_string())),
        }
    }
}

/// The outcome a scenario expects for one operation.
///
/// Operations absent from a scenario's expectation map are not probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Expectation {
    /// The operation should succeed under the scenario's claims.
    Allow,
    /// The operation should be blocked by policy.
    Deny,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Allow => f.write_str("ALLOW"),
            Expectation::Deny => f.write_str("DENY"),
        }
    }
}
