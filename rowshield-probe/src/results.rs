//! Per-probe records and run aggregation.

use serde::Serialize;

use rowshield_config::{Expectation, Op};

use crate::engine::ProbeObservation;
use crate::outcome::{OutcomeKind, ProbeOutcome};

/// One probe, evaluated against its expectation.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    /// `schema.name` for tables, `storage:<bucket>` for buckets.
    pub table_key: String,
    /// Scenario name.
    pub scenario: String,
    /// The session role the scenario probed as (`anon` or `authenticated`).
    pub session_role: String,
    /// The probed operation.
    pub op: Op,
    /// What the plan expected.
    pub expected: Expectation,
    /// What the probe observed.
    pub actual: ProbeOutcome,
    /// Whether observed matched expected. SKIPPED and ERROR never pass.
    pub passed: bool,
    /// Retained error text (classification detail or the probe's own
    /// reason), when any exists.
    pub error: Option<String>,
    /// Wall-clock duration of the probe.
    pub duration_ms: u64,
}

impl TestResult {
    /// Evaluate one observation against the plan.
    pub fn evaluate(
        table_key: impl Into<String>,
        scenario: impl Into<String>,
        session_role: impl Into<String>,
        op: Op,
        expected: Expectation,
        observation: ProbeObservation,
        duration_ms: u64,
    ) -> Self {
        let passed = matches!(
            (&observation.outcome, expected),
            (ProbeOutcome::Allow, Expectation::Allow) | (ProbeOutcome::Deny, Expectation::Deny)
        );

        let error = observation
            .outcome
            .reason()
            .map(String::from)
            .or(observation.detail);

        Self {
            table_key: table_key.into(),
            scenario: scenario.into(),
            session_role: session_role.into(),
            op,
            expected,
            actual: observation.outcome,
            passed,
            error,
            duration_ms,
        }
    }

    /// An expected-DENY probe that observed ALLOW: the signature of a
    /// policy hole.
    pub fn is_leak_candidate(&self) -> bool {
        self.expected == Expectation::Deny && self.actual == ProbeOutcome::Allow
    }

    /// The outcome kind, for matrices and snapshots.
    pub fn outcome_kind(&self) -> OutcomeKind {
        self.actual.kind()
    }
}

/// Aggregated results of one run.
#[derive(Debug, Clone, Serialize)]
pub struct TestResults {
    /// Every probe, sorted by `(table_key, scenario, op)`.
    pub results: Vec<TestResult>,
    /// Total probes.
    pub total: usize,
    /// Probes whose outcome matched the expectation.
    pub passed: usize,
    /// Probes that ran, classified, and did not match.
    pub failed: usize,
    /// Probes that could not execute.
    pub errored: usize,
    /// Probes not attempted for structural reasons.
    pub skipped: usize,
    /// Tables the plan named that have RLS disabled; never probed.
    pub rls_disabled_tables: Vec<String>,
    /// Wall-clock duration of the whole run.
    pub duration_ms: u64,
}

impl TestResults {
    /// Sort, count, and seal a result set.
    ///
    /// Sorting here is what makes output deterministic: the orchestrator
    /// guarantees no cross-probe ordering, so presentation order must not
    /// depend on scheduling.
    pub fn aggregate(
        mut results: Vec<TestResult>,
        rls_disabled_tables: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        results.sort_by(|a, b| {
            a.table_key
                .cmp(&b.table_key)
                .then_with(|| a.scenario.cmp(&b.scenario))
                .then_with(|| a.op.cmp(&b.op))
        });

        let total = results.len();
        let mut passed = 0;
        let mut errored = 0;
        let mut skipped = 0;

        for result in &results {
            match result.outcome_kind() {
                OutcomeKind::Error => errored += 1,
                OutcomeKind::Skipped => skipped += 1,
                _ if result.passed => passed += 1,
                _ => {}
            }
        }

        let failed = total - passed - errored - skipped;

        Self {
            results,
            total,
            passed,
            failed,
            errored,
            skipped,
            rls_disabled_tables,
            duration_ms,
        }
    }

    /// Whether the run should exit zero.
    pub fn all_clear(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Failing results, in presentation order.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results
            .iter()
            .filter(|r| !r.passed && !matches!(r.outcome_kind(), OutcomeKind::Skipped | OutcomeKind::Error))
    }
}
