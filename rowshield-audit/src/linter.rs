//! Static policy checks.
//!
//! Deliberately textual: trim, compare, substring-search. The linter must
//! be fast and conservative; it never parses SQL, so it can never mistake
//! a complex-but-correct expression for a dangerous one.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::introspect::{PolicyCommand, PolicyInfo, TableMeta};

/// Issue severity, ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => f.write_str("CRITICAL"),
            Severity::High => f.write_str("HIGH"),
            Severity::Medium => f.write_str("MEDIUM"),
            Severity::Low => f.write_str("LOW"),
        }
    }
}

/// The named checks an issue can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckId {
    AlwaysTrueUsing,
    AlwaysTrueWithCheck,
    NoAuthUidCheck,
    PermissiveForAll,
    MissingWithCheck,
    RlsDisabled,
    SensitiveColumnExposed,
}

impl CheckId {
    /// The stable identifier reports use.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::AlwaysTrueUsing => "ALWAYS_TRUE_USING",
            CheckId::AlwaysTrueWithCheck => "ALWAYS_TRUE_WITH_CHECK",
            CheckId::NoAuthUidCheck => "NO_AUTH_UID_CHECK",
            CheckId::PermissiveForAll => "PERMISSIVE_FOR_ALL",
            CheckId::MissingWithCheck => "MISSING_WITH_CHECK",
            CheckId::RlsDisabled => "RLS_DISABLED",
            CheckId::SensitiveColumnExposed => "SENSITIVE_COLUMN_EXPOSED",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding.
#[derive(Debug, Clone, Serialize)]
pub struct LintIssue {
    /// How bad it is.
    pub severity: Severity,
    /// Which check fired.
    pub check: CheckId,
    /// What the issue is about: `schema.table.policy` for policy checks,
    /// `schema.table` or `schema.table.column` otherwise.
    pub subject: String,
    /// Human-readable description.
    pub message: String,
    /// The offending expression, when one exists.
    pub expression: Option<String>,
    /// What to do about it.
    pub fix_hint: String,
}

/// All findings of a lint pass, grouped and counted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LintResults {
    /// Issues sorted by severity, then subject.
    pub issues: Vec<LintIssue>,
    /// Count per severity.
    pub counts: BTreeMap<Severity, usize>,
    /// Number of policies examined.
    pub policies_checked: usize,
}

impl LintResults {
    /// Build results from raw issues.
    pub fn from_issues(mut issues: Vec<LintIssue>, policies_checked: usize) -> Self {
        issues.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.subject.cmp(&b.subject))
        });

        let mut counts = BTreeMap::new();
        for issue in &issues {
            *counts.entry(issue.severity).or_insert(0) += 1;
        }

        Self {
            issues,
            counts,
            policies_checked,
        }
    }

    /// Count for one severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.counts.get(&severity).copied().unwrap_or(0)
    }

    /// Whether any CRITICAL or HIGH issue is present (drives the exit
    /// signal for lint and audit runs).
    pub fn has_blocking_issues(&self) -> bool {
        self.count(Severity::Critical) > 0 || self.count(Severity::High) > 0
    }
}

/// Whether a trimmed expression is the literal always-true form.
///
/// Exactly `true` or `(true)` after trimming; nothing else fires, by
/// contract.
fn is_literal_true(expression: &str) -> bool {
    matches!(expression.trim(), "true" | "(true)")
}

/// Run every policy of every table through the checks.
pub fn lint_policies(tables: &[TableMeta]) -> LintResults {
    let mut issues = Vec::new();
    let mut policies_checked = 0;

    for table in tables {
        for policy in &table.policies {
            policies_checked += 1;
            lint_one(table, policy, &mut issues);
        }
    }

    LintResults::from_issues(issues, policies_checked)
}

fn lint_one(table: &TableMeta, policy: &PolicyInfo, issues: &mut Vec<LintIssue>) {
    let subject = format!("{}.{}", table.fqn(), policy.name);

    if let Some(using) = &policy.using_expression {
        if is_literal_true(using) {
            issues.push(LintIssue {
                severity: Severity::Critical,
                check: CheckId::AlwaysTrueUsing,
                subject: subject.clone(),
                message: format!(
                    "policy '{}' on {} makes every row visible: USING (true)",
                    policy.name,
                    table.fqn()
                ),
                expression: Some(using.clone()),
                fix_hint: "replace USING (true) with a predicate that scopes rows to the caller, e.g. USING (auth.uid() = user_id)".to_string(),
            });
        }
    }

    if let Some(with_check) = &policy.with_check_expression {
        if is_literal_true(with_check) {
            issues.push(LintIssue {
                severity: Severity::Critical,
                check: CheckId::AlwaysTrueWithCheck,
                subject: subject.clone(),
                message: format!(
                    "policy '{}' on {} accepts any written row: WITH CHECK (true)",
                    policy.name,
                    table.fqn()
                ),
                expression: Some(with_check.clone()),
                fix_hint: "constrain WITH CHECK so writers can only produce rows they own".to_string(),
            });
        }
    }

    if policy.command == PolicyCommand::Select {
        if let Some(using) = &policy.using_expression {
            if !is_literal_true(using) && !using.contains("auth.uid()") {
                issues.push(LintIssue {
                    severity: Severity::High,
                    check: CheckId::NoAuthUidCheck,
                    subject: subject.clone(),
                    message: format!(
                        "SELECT policy '{}' on {} does not reference auth.uid(); visibility may not be tied to the caller",
                        policy.name,
                        table.fqn()
                    ),
                    expression: Some(using.clone()),
                    fix_hint: "tie row visibility to the caller identity via auth.uid()".to_string(),
                });
            }
        }
    }

    if policy.applies_to_public() {
        issues.push(LintIssue {
            severity: Severity::Medium,
            check: CheckId::PermissiveForAll,
            subject: subject.clone(),
            message: format!(
                "policy '{}' on {} applies to PUBLIC (all roles)",
                policy.name,
                table.fqn()
            ),
            expression: None,
            fix_hint: "name the roles the policy is meant for (TO anon, authenticated)".to_string(),
        });
    }

    if matches!(
        policy.command,
        PolicyCommand::Insert | PolicyCommand::Update
    ) && policy.using_expression.is_some()
        && policy.with_check_expression.is_none()
    {
        issues.push(LintIssue {
            severity: Severity::Medium,
            check: CheckId::MissingWithCheck,
            subject,
            message: format!(
                "{} policy '{}' on {} has USING but no WITH CHECK; written rows are not validated",
                policy.command.as_str(),
                policy.name,
                table.fqn()
            ),
            expression: policy.using_expression.clone(),
            fix_hint: "add a WITH CHECK clause mirroring the USING predicate".to_string(),
        });
    }
}
