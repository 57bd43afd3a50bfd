//! Audit aggregation: discovery + linter + sensitive scan in one report.

use serde::Serialize;

use crate::introspect::{ColumnGrant, Discovery};
use crate::linter::{CheckId, LintIssue, LintResults, Severity, lint_policies};
use crate::sensitive::SensitiveColumnScanner;

/// The combined result of an audit run.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Tables examined.
    pub tables_scanned: usize,
    /// Storage buckets examined.
    pub buckets_scanned: usize,
    /// All findings, sorted by severity.
    pub results: LintResults,
}

impl AuditReport {
    /// Build the report from discovery output.
    ///
    /// Policy checks run over table policies and the shared storage-object
    /// policies; RLS-disabled warnings are promoted to CRITICAL findings;
    /// the sensitive-column scan contributes HIGH findings.
    pub fn build(
        discovery: &Discovery,
        column_grants: &[ColumnGrant],
        scanner: &SensitiveColumnScanner,
    ) -> Self {
        let mut lint = lint_policies(&discovery.tables);
        let mut issues = std::mem::take(&mut lint.issues);
        let mut policies_checked = lint.policies_checked;

        // Storage policies are shared across buckets; lint them once.
        if let Some(bucket) = discovery.storage_buckets.first() {
            let objects_table = crate::introspect::TableMeta {
                schema: "storage".to_string(),
                name: "objects".to_string(),
                rls_enabled: true,
                rls_forced: false,
                policies: bucket.policies.clone(),
            };
            let storage_lint = lint_policies(std::slice::from_ref(&objects_table));
            policies_checked += storage_lint.policies_checked;
            issues.extend(storage_lint.issues);
        }

        for warning in &discovery.warnings {
            issues.push(LintIssue {
                severity: Severity::Critical,
                check: CheckId::RlsDisabled,
                subject: warning.table.clone(),
                message: warning.message.clone(),
                expression: None,
                fix_hint: format!(
                    "ALTER TABLE {} ENABLE ROW LEVEL SECURITY; then add policies for each role",
                    warning.table
                ),
            });
        }

        issues.extend(scanner.scan(column_grants));

        Self {
            tables_scanned: discovery.tables.len(),
            buckets_scanned: discovery.storage_buckets.len(),
            results: LintResults::from_issues(issues, policies_checked),
        }
    }

    /// Whether the audit should exit non-zero.
    pub fn has_blocking_issues(&self) -> bool {
        self.results.has_blocking_issues()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::{IntrospectionWarning, PolicyCommand, PolicyInfo, TableMeta};
    use pretty_assertions::assert_eq;

    fn discovery() -> Discovery {
        Discovery {
            tables: vec![TableMeta {
                schema: "public".to_string(),
                name: "orders".to_string(),
                rls_enabled: false,
                rls_forced: false,
                policies: Vec::new(),
            }],
            storage_buckets: Vec::new(),
            warnings: vec![IntrospectionWarning {
                table: "public.orders".to_string(),
                message: "row-level security is disabled on public.orders; grants alone gate access"
                    .to_string(),
            }],
        }
    }

    #[test]
    fn test_rls_disabled_becomes_critical() {
        let report = AuditReport::build(
            &discovery(),
            &[],
            &SensitiveColumnScanner::with_defaults(),
        );

        assert_eq!(report.tables_scanned, 1);
        assert_eq!(report.results.count(Severity::Critical), 1);
        assert_eq!(report.results.issues[0].check, CheckId::RlsDisabled);
        assert!(report.has_blocking_issues());
    }

    #[test]
    fn test_sensitive_grant_drives_exit_signal() {
        let mut d = discovery();
        d.tables[0].rls_enabled = true;
        d.warnings.clear();

        let grants = vec![ColumnGrant {
            schema: "public".to_string(),
            table: "users".to_string(),
            column: "password_hash".to_string(),
            grantee: "anon".to_string(),
        }];

        let report =
            AuditReport::build(&d, &grants, &SensitiveColumnScanner::with_defaults());

        assert_eq!(report.results.count(Severity::High), 1);
        assert!(report.has_blocking_issues());
    }

    #[test]
    fn test_storage_policies_are_linted_once() {
        let leaky = PolicyInfo {
            name: "objects_select".to_string(),
            command: PolicyCommand::Select,
            roles: vec!["anon".to_string()],
            using_expression: Some("true".to_string()),
            with_check_expression: None,
        };

        let mut d = discovery();
        d.tables.clear();
        d.warnings.clear();
        d.storage_buckets = vec![
            crate::introspect::StorageBucketMeta {
                id: "avatars".to_string(),
                name: "avatars".to_string(),
                is_public: false,
                policies: vec![leaky.clone()],
            },
            crate::introspect::StorageBucketMeta {
                id: "exports".to_string(),
                name: "exports".to_string(),
                is_public: false,
                policies: vec![leaky],
            },
        ];

        let report = AuditReport::build(&d, &[], &SensitiveColumnScanner::with_defaults());

        // Two buckets share the policy list; the finding appears once.
        assert_eq!(report.results.count(Severity::Critical), 1);
        assert_eq!(report.buckets_scanned, 2);
    }

    #[test]
    fn test_clean_database_has_no_blocking_issues() {
        let d = Discovery {
            tables: vec![TableMeta {
                schema: "public".to_string(),
                name: "todos".to_string(),
                rls_enabled: true,
                rls_forced: false,
                policies: vec![PolicyInfo {
                    name: "own_rows".to_string(),
                    command: PolicyCommand::Select,
                    roles: vec!["authenticated".to_string()],
                    using_expression: Some("(auth.uid() = user_id)".to_string()),
                    with_check_expression: None,
                }],
            }],
            storage_buckets: Vec::new(),
            warnings: Vec::new(),
        };

        let report = AuditReport::build(&d, &[], &SensitiveColumnScanner::with_defaults());
        assert!(!report.has_blocking_issues());
        assert_eq!(report.results.policies_checked, 1);
    }
}
