//! Coverage projection: per-table access matrix by role and operation.

use std::collections::BTreeMap;

use serde::Serialize;

use rowshield_audit::Discovery;
use rowshield_config::Op;

use crate::outcome::OutcomeKind;
use crate::results::TestResults;

/// Observed access per role.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessMatrix {
    /// Outcomes observed probing as `anon`.
    pub anonymous: BTreeMap<Op, OutcomeKind>,
    /// Outcomes observed probing as `authenticated`.
    pub authenticated: BTreeMap<Op, OutcomeKind>,
}

impl AccessMatrix {
    fn record(&mut self, session_role: &str, op: Op, outcome: OutcomeKind) {
        let slot = if session_role == "authenticated" {
            self.authenticated.entry(op)
        } else {
            self.anonymous.entry(op)
        };

        // Several scenarios can probe the same role; keep the most
        // permissive observation, since that is the one that matters for
        // exposure.
        slot.and_modify(|existing| {
            if outcome < *existing {
                *existing = outcome;
            }
        })
        .or_insert(outcome);
    }

    fn full_allow() -> BTreeMap<Op, OutcomeKind> {
        Op::ALL
            .into_iter()
            .map(|op| (op, OutcomeKind::Allow))
            .collect()
    }
}

/// One table's coverage row.
#[derive(Debug, Clone, Serialize)]
pub struct TableCoverage {
    /// `schema.name` (or `storage:<bucket>`).
    pub table_key: String,
    /// Whether RLS is enabled on the table.
    pub rls_enabled: bool,
    /// The observed access matrix.
    pub access: AccessMatrix,
    /// Critical warning attached to RLS-disabled rows.
    pub warning: Option<String>,
}

/// The coverage report: one row per table, sorted by key.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    /// Rows sorted by `(schema, name)`.
    pub tables: Vec<TableCoverage>,
}

impl CoverageReport {
    /// Project run results into the matrix.
    ///
    /// Tables with RLS disabled were never probed; they get synthetic
    /// full-ALLOW rows for both roles, because with RLS off that is the
    /// observable security semantic (only grants gate access), plus a
    /// critical warning.
    pub fn build(discovery: &Discovery, results: &TestResults) -> Self {
        let mut rows: BTreeMap<String, TableCoverage> = BTreeMap::new();

        for result in &results.results {
            let row = rows
                .entry(result.table_key.clone())
                .or_insert_with(|| TableCoverage {
                    table_key: result.table_key.clone(),
                    rls_enabled: rls_enabled_for(discovery, &result.table_key),
                    access: AccessMatrix::default(),
                    warning: None,
                });
            row.access
                .record(&result.session_role, result.op, result.outcome_kind());
        }

        for table_key in &results.rls_disabled_tables {
            rows.insert(
                table_key.clone(),
                TableCoverage {
                    table_key: table_key.clone(),
                    rls_enabled: false,
                    access: AccessMatrix {
                        anonymous: AccessMatrix::full_allow(),
                        authenticated: AccessMatrix::full_allow(),
                    },
                    warning: Some(format!(
                        "CRITICAL: row-level security is disabled on {}; every role with a grant has full access",
                        table_key
                    )),
                },
            );
        }

        Self {
            tables: rows.into_values().collect(),
        }
    }

    /// Whether any row carries a critical warning.
    pub fn has_critical_rows(&self) -> bool {
        self.tables.iter().any(|t| t.warning.is_some())
    }
}

fn rls_enabled_for(discovery: &Discovery, table_key: &str) -> bool {
    discovery
        .tables
        .iter()
        .find(|t| t.fqn() == table_key)
        .map(|t| t.rls_enabled)
        // Unknown relations (storage buckets, tables outside discovery)
        // were probed, which implies policies were in play.
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProbeObservation;
    use crate::outcome::ProbeOutcome;
    use crate::results::TestResult;
    use pretty_assertions::assert_eq;
    use rowshield_audit::TableMeta;
    use rowshield_config::Expectation;

    fn discovery() -> Discovery {
        Discovery {
            tables: vec![TableMeta {
                schema: "public".to_string(),
                name: "todos".to_string(),
                rls_enabled: true,
                rls_forced: false,
                policies: Vec::new(),
            }],
            storage_buckets: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn result(scenario: &str, role: &str, op: Op, outcome: ProbeOutcome) -> TestResult {
        TestResult::evaluate(
            "public.todos",
            scenario,
            role,
            op,
            Expectation::Deny,
            ProbeObservation {
                outcome,
                detail: None,
            },
            1,
        )
    }

    #[test]
    fn test_projection_by_role() {
        let results = TestResults::aggregate(
            vec![
                result("anonymous", "anon", Op::Select, ProbeOutcome::Deny),
                result("owner", "authenticated", Op::Select, ProbeOutcome::Allow),
            ],
            Vec::new(),
            1,
        );

        let report = CoverageReport::build(&discovery(), &results);
        assert_eq!(report.tables.len(), 1);

        let row = &report.tables[0];
        assert!(row.rls_enabled);
        assert_eq!(row.access.anonymous[&Op::Select], OutcomeKind::Deny);
        assert_eq!(row.access.authenticated[&Op::Select], OutcomeKind::Allow);
        assert!(!report.has_critical_rows());
    }

    #[test]
    fn test_most_permissive_observation_wins() {
        let results = TestResults::aggregate(
            vec![
                result("a", "authenticated", Op::Update, ProbeOutcome::Deny),
                result("b", "authenticated", Op::Update, ProbeOutcome::Allow),
                result("c", "authenticated", Op::Update, ProbeOutcome::Deny),
            ],
            Vec::new(),
            1,
        );

        let report = CoverageReport::build(&discovery(), &results);
        assert_eq!(
            report.tables[0].access.authenticated[&Op::Update],
            OutcomeKind::Allow
        );
    }

    #[test]
    fn test_rls_disabled_synthetic_row() {
        let results = TestResults::aggregate(
            Vec::new(),
            vec!["public.orders".to_string()],
            1,
        );

        let report = CoverageReport::build(&discovery(), &results);
        let row = &report.tables[0];

        assert_eq!(row.table_key, "public.orders");
        assert!(!row.rls_enabled);
        assert_eq!(row.access.anonymous.len(), 4);
        assert!(
            row.access
                .anonymous
                .values()
                .all(|o| *o == OutcomeKind::Allow)
        );
        assert!(row.warning.as_deref().unwrap().contains("CRITICAL"));
        assert!(report.has_critical_rows());
    }

    #[test]
    fn test_rows_sorted_by_key() {
        let mut results = vec![
            result("anonymous", "anon", Op::Select, ProbeOutcome::Deny),
        ];
        results.push(TestResult::evaluate(
            "public.apples",
            "anonymous",
            "anon",
            Op::Select,
            Expectation::Deny,
            ProbeObservation {
                outcome: ProbeOutcome::Deny,
                detail: None,
            },
            1,
        ));

        let aggregated = TestResults::aggregate(results, Vec::new(), 1);
        let report = CoverageReport::build(&discovery(), &aggregated);

        let keys: Vec<&str> = report.tables.iter().map(|t| t.table_key.as_str()).collect();
        assert_eq!(keys, vec!["public.apples", "public.todos"]);
    }
}
