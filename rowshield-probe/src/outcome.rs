//! Probe outcomes and database-error classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;

/// What a single probe observed.
///
/// `Allow` and `Deny` never carry a reason; `Error` and `Skipped` always
/// do. When a probe classifies a server error as ALLOW or DENY, the error
/// text survives in [`crate::TestResult::error`] so a stricter downstream
/// consumer can re-bucket without re-probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "UPPERCASE")]
pub enum ProbeOutcome {
    /// The operation went through (or failed for a non-policy reason).
    Allow,
    /// A policy or privilege blocked the operation.
    Deny,
    /// The probe could not be executed at all (e.g. connection lost).
    Error(String),
    /// The probe was not attempted for a structural reason (e.g. no
    /// primary key for a mutation).
    Skipped(String),
}

impl ProbeOutcome {
    /// The reason-free kind, used for comparisons and snapshots.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ProbeOutcome::Allow => OutcomeKind::Allow,
            ProbeOutcome::Deny => OutcomeKind::Deny,
            ProbeOutcome::Error(_) => OutcomeKind::Error,
            ProbeOutcome::Skipped(_) => OutcomeKind::Skipped,
        }
    }

    /// The reason, for the two variants that carry one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Error(reason) | ProbeOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// The four-valued outcome without reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeKind {
    Allow,
    Deny,
    Error,
    Skipped,
}

impl OutcomeKind {
    /// The report spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Allow => "ALLOW",
            OutcomeKind::Deny => "DENY",
            OutcomeKind::Error => "ERROR",
            OutcomeKind::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a server-reported error into an outcome plus the retained
/// error text.
///
/// SQLSTATE `42501` (insufficient privilege, which also covers row-level
/// security violations) and anything mentioning `permission denied` or
/// `policy` is the expected shape of a policy denial: DENY. A duplicate
/// key (`23505`) means the write check passed and the collision is
/// coincidental: ALLOW. Every other server error is ALLOW — the operation
/// was attempted and not blocked by a policy — with the cause kept for
/// stricter consumers.
pub fn classify_db_error(err: &tokio_postgres::Error) -> (ProbeOutcome, Option<String>) {
    let detail = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());

    if let Some(code) = err.code() {
        if *code == SqlState::INSUFFICIENT_PRIVILEGE {
            return (ProbeOutcome::Deny, Some(detail));
        }
        if *code == SqlState::UNIQUE_VIOLATION {
            return (ProbeOutcome::Allow, Some(detail));
        }
    }

    if detail.contains("permission denied") || detail.contains("policy") {
        return (ProbeOutcome::Deny, Some(detail));
    }

    (ProbeOutcome::Allow, Some(detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_projection() {
        assert_eq!(ProbeOutcome::Allow.kind(), OutcomeKind::Allow);
        assert_eq!(
            ProbeOutcome::Skipped("no primary key".to_string()).kind(),
            OutcomeKind::Skipped
        );
    }

    #[test]
    fn test_reasons_only_on_error_and_skipped() {
        assert!(ProbeOutcome::Allow.reason().is_none());
        assert!(ProbeOutcome::Deny.reason().is_none());
        assert_eq!(
            ProbeOutcome::Error("connection lost".to_string()).reason(),
            Some("connection lost")
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&ProbeOutcome::Allow).unwrap();
        assert_eq!(json, r#"{"result":"ALLOW"}"#);

        let json =
            serde_json::to_string(&ProbeOutcome::Skipped("no primary key".to_string())).unwrap();
        assert_eq!(json, r#"{"result":"SKIPPED","reason":"no primary key"}"#);

        let outcome: ProbeOutcome =
            serde_json::from_str(r#"{"result":"DENY"}"#).unwrap();
        assert_eq!(outcome, ProbeOutcome::Deny);
    }

    #[test]
    fn test_outcome_kind_display() {
        assert_eq!(OutcomeKind::Allow.to_string(), "ALLOW");
        assert_eq!(OutcomeKind::Skipped.to_string(), "SKIPPED");
    }
}
