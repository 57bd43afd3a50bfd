//! Snapshot comparison with security-aware classification.

use serde::Serialize;

use rowshield_config::Op;
use rowshield_probe::OutcomeKind;

use crate::snapshot::PolicySnapshot;

/// One changed cell.
#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    /// Table key.
    pub table: String,
    /// Scenario name.
    pub scenario: String,
    /// Operation.
    pub op: Op,
    /// Previous outcome, absent for newly-introduced cells.
    pub previous: Option<OutcomeKind>,
    /// Current outcome.
    pub current: OutcomeKind,
}

impl DiffEntry {
    /// The rendering used in reports, e.g.
    /// `public.posts -> anonymous -> SELECT (changed from DENY to ALLOW)`.
    pub fn describe(&self) -> String {
        match self.previous {
            Some(previous) => format!(
                "{} -> {} -> {} (changed from {} to {})",
                self.table, self.scenario, self.op, previous, self.current
            ),
            None => format!(
                "{} -> {} -> {} (newly introduced: {})",
                self.table, self.scenario, self.op, self.current
            ),
        }
    }
}

/// The classified result of comparing two snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotDiff {
    /// `DENY` became `ALLOW`: critical, sets the exit signal.
    pub leaks: Vec<DiffEntry>,
    /// Any other change between two recorded outcomes.
    pub regressions: Vec<DiffEntry>,
    /// Cells with no previous recording.
    pub newly_introduced: Vec<DiffEntry>,
}

impl SnapshotDiff {
    /// True iff no bucket fired.
    pub fn is_identical(&self) -> bool {
        self.leaks.is_empty() && self.regressions.is_empty() && self.newly_introduced.is_empty()
    }

    /// One-line summary for terminal output.
    pub fn summary(&self) -> String {
        if self.is_identical() {
            return "no behavioral changes".to_string();
        }

        let mut parts = Vec::new();
        if !self.leaks.is_empty() {
            parts.push(format!("{} leak(s)", self.leaks.len()));
        }
        if !self.regressions.is_empty() {
            parts.push(format!("{} regression(s)", self.regressions.len()));
        }
        if !self.newly_introduced.is_empty() {
            parts.push(format!("{} newly introduced", self.newly_introduced.len()));
        }
        parts.join(", ")
    }
}

/// Compare `previous` against `current`, cell by cell.
///
/// Reasons are ignored on purpose: a changed error message is noise, a
/// changed outcome kind is signal. Cells present only in `previous` (a
/// table or scenario dropped from the plan) are not classified; there is
/// no current behavior to judge.
pub fn diff(previous: &PolicySnapshot, current: &PolicySnapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (table, scenarios) in &current.matrix {
        for (scenario, ops) in scenarios {
            for (op, recorded) in ops {
                let entry = |previous_kind: Option<OutcomeKind>| DiffEntry {
                    table: table.clone(),
                    scenario: scenario.clone(),
                    op: *op,
                    previous: previous_kind,
                    current: recorded.result,
                };

                match previous.outcome(table, scenario, *op) {
                    None => result.newly_introduced.push(entry(None)),
                    Some(before) if before.result == recorded.result => {}
                    Some(before) => {
                        let is_leak = before.result == OutcomeKind::Deny
                            && recorded.result == OutcomeKind::Allow;
                        if is_leak {
                            result.leaks.push(entry(Some(before.result)));
                        } else {
                            result.regressions.push(entry(Some(before.result)));
                        }
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{RecordedOutcome, SNAPSHOT_VERSION};
    use chrono::Utc;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn snapshot(cells: &[(&str, &str, Op, OutcomeKind)]) -> PolicySnapshot {
        let mut matrix: IndexMap<String, crate::snapshot::ScenarioMatrix> = IndexMap::new();
        for (table, scenario, op, kind) in cells {
            matrix
                .entry(table.to_string())
                .or_default()
                .entry(scenario.to_string())
                .or_default()
                .insert(
                    *op,
                    RecordedOutcome {
                        result: *kind,
                        reason: None,
                    },
                );
        }
        PolicySnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            database: "db".to_string(),
            matrix,
        }
    }

    #[test]
    fn test_identical_snapshots() {
        let a = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Deny)]);
        let b = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Deny)]);

        let result = diff(&a, &b);
        assert!(result.is_identical());
        assert_eq!(result.summary(), "no behavioral changes");
    }

    #[test]
    fn test_deny_to_allow_is_a_leak() {
        let previous = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Deny)]);
        let current = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Allow)]);

        let result = diff(&previous, &current);
        assert_eq!(result.leaks.len(), 1);
        assert!(result.regressions.is_empty());
        assert_eq!(
            result.leaks[0].describe(),
            "public.posts -> anonymous -> SELECT (changed from DENY to ALLOW)"
        );
    }

    #[test]
    fn test_allow_to_deny_is_a_regression() {
        let previous = snapshot(&[("public.posts", "owner", Op::Update, OutcomeKind::Allow)]);
        let current = snapshot(&[("public.posts", "owner", Op::Update, OutcomeKind::Deny)]);

        let result = diff(&previous, &current);
        assert!(result.leaks.is_empty());
        assert_eq!(result.regressions.len(), 1);
    }

    #[test]
    fn test_error_transitions_are_regressions_not_leaks() {
        let previous = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Error)]);
        let current = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Allow)]);

        let result = diff(&previous, &current);
        assert!(result.leaks.is_empty());
        assert_eq!(result.regressions.len(), 1);
    }

    #[test]
    fn test_new_cell_is_newly_introduced() {
        let previous = snapshot(&[]);
        let current = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Deny)]);

        let result = diff(&previous, &current);
        assert_eq!(result.newly_introduced.len(), 1);
        assert!(result.newly_introduced[0].previous.is_none());
        assert!(
            result.newly_introduced[0]
                .describe()
                .contains("newly introduced")
        );
    }

    #[test]
    fn test_removed_cell_is_ignored() {
        let previous = snapshot(&[("public.old", "anonymous", Op::Select, OutcomeKind::Deny)]);
        let current = snapshot(&[]);

        let result = diff(&previous, &current);
        assert!(result.is_identical());
    }

    #[test]
    fn test_diff_antisymmetry_on_deny_allow_transitions() {
        // diff(A, B).leaks mirrors diff(B, A).regressions restricted to
        // the DENY/ALLOW pair.
        let a = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Deny)]);
        let b = snapshot(&[("public.posts", "anonymous", Op::Select, OutcomeKind::Allow)]);

        let forward = diff(&a, &b);
        let backward = diff(&b, &a);

        assert_eq!(forward.leaks.len(), 1);
        assert_eq!(backward.leaks.len(), 0);
        assert_eq!(backward.regressions.len(), 1);
        assert_eq!(
            backward.regressions[0].previous,
            Some(OutcomeKind::Allow)
        );
        assert_eq!(backward.regressions[0].current, OutcomeKind::Deny);
    }

    #[test]
    fn test_summary_counts() {
        let previous = snapshot(&[
            ("public.a", "anonymous", Op::Select, OutcomeKind::Deny),
            ("public.b", "anonymous", Op::Select, OutcomeKind::Allow),
        ]);
        let current = snapshot(&[
            ("public.a", "anonymous", Op::Select, OutcomeKind::Allow),
            ("public.b", "anonymous", Op::Select, OutcomeKind::Deny),
            ("public.c", "anonymous", Op::Select, OutcomeKind::Deny),
        ]);

        let result = diff(&previous, &current);
        assert_eq!(
            result.summary(),
            "1 leak(s), 1 regression(s), 1 newly introduced"
        );
    }
}
