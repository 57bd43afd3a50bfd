//! The snapshot model: a flattened probe matrix with a self-describing
//! header.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use rowshield_config::Op;
use rowshield_probe::{OutcomeKind, TestResults};

/// The snapshot format version this build writes and reads.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One recorded cell: the outcome kind plus the retained reason for
/// ERROR/SKIPPED cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOutcome {
    /// The classified outcome.
    pub result: OutcomeKind,
    /// Reason text, present for ERROR and SKIPPED cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-scenario outcomes for one table.
pub type ScenarioMatrix = IndexMap<String, IndexMap<Op, RecordedOutcome>>;

/// A persisted probe matrix.
///
/// Map order is meaningful: it follows the sorted result order of the run
/// that produced the snapshot, so serialized snapshots are stable and
/// human-diffable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// The database the run probed (credentials masked).
    pub database: String,
    /// `table -> scenario -> operation -> outcome`.
    pub matrix: IndexMap<String, ScenarioMatrix>,
}

impl PolicySnapshot {
    /// Flatten run results into a snapshot.
    pub fn capture(results: &TestResults, database: impl Into<String>) -> Self {
        let mut matrix: IndexMap<String, ScenarioMatrix> = IndexMap::new();

        for result in &results.results {
            matrix
                .entry(result.table_key.clone())
                .or_default()
                .entry(result.scenario.clone())
                .or_default()
                .insert(
                    result.op,
                    RecordedOutcome {
                        result: result.outcome_kind(),
                        reason: result.actual.reason().map(String::from),
                    },
                );
        }

        Self {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            database: database.into(),
            matrix,
        }
    }

    /// Look up one cell.
    pub fn outcome(&self, table: &str, scenario: &str, op: Op) -> Option<&RecordedOutcome> {
        self.matrix.get(table)?.get(scenario)?.get(&op)
    }

    /// Total number of recorded cells.
    pub fn cell_count(&self) -> usize {
        self.matrix
            .values()
            .flat_map(|scenarios| scenarios.values())
            .map(|ops| ops.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowshield_config::Expectation;
    use rowshield_probe::{ProbeObservation, ProbeOutcome, TestResult};

    fn results() -> TestResults {
        let results = vec![
            TestResult::evaluate(
                "public.posts",
                "anonymous",
                "anon",
                Op::Select,
                Expectation::Deny,
                ProbeObservation {
                    outcome: ProbeOutcome::Deny,
                    detail: None,
                },
                2,
            ),
            TestResult::evaluate(
                "public.nopk",
                "authenticated",
                "authenticated",
                Op::Update,
                Expectation::Allow,
                ProbeObservation {
                    outcome: ProbeOutcome::Skipped("no primary key".to_string()),
                    detail: None,
                },
                1,
            ),
        ];
        TestResults::aggregate(results, Vec::new(), 3)
    }

    #[test]
    fn test_capture_shape() {
        let snapshot = PolicySnapshot::capture(&results(), "postgresql://probe@localhost/app");

        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.cell_count(), 2);

        let cell = snapshot
            .outcome("public.posts", "anonymous", Op::Select)
            .unwrap();
        assert_eq!(cell.result, OutcomeKind::Deny);
        assert!(cell.reason.is_none());

        let cell = snapshot
            .outcome("public.nopk", "authenticated", Op::Update)
            .unwrap();
        assert_eq!(cell.result, OutcomeKind::Skipped);
        assert_eq!(cell.reason.as_deref(), Some("no primary key"));
    }

    #[test]
    fn test_capture_follows_sorted_result_order() {
        let snapshot = PolicySnapshot::capture(&results(), "db");
        let tables: Vec<&String> = snapshot.matrix.keys().collect();
        // TestResults sorts by table key; capture preserves that order.
        assert_eq!(tables, vec!["public.nopk", "public.posts"]);
    }

    #[test]
    fn test_json_round_trip_preserves_everything() {
        let snapshot = PolicySnapshot::capture(&results(), "db");
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        let reloaded: PolicySnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded.version, snapshot.version);
        assert_eq!(reloaded.database, snapshot.database);
        assert_eq!(
            reloaded.matrix.keys().collect::<Vec<_>>(),
            snapshot.matrix.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            reloaded.outcome("public.posts", "anonymous", Op::Select),
            snapshot.outcome("public.posts", "anonymous", Op::Select)
        );
    }
}
