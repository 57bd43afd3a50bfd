//! Sensitive-column exposure scan.

use regex_lite::Regex;

use crate::error::{AuditError, AuditResult};
use crate::introspect::ColumnGrant;
use crate::linter::{CheckId, LintIssue, Severity};

/// Column-name patterns that usually hold secrets.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "ssn",
    "social_security",
    "credit_card",
    "card_number",
    "cvv",
    "api_key",
    "apikey",
    "private_key",
    "salary",
    "bank_account",
    "iban",
];

/// Matches column names against a configurable pattern set.
pub struct SensitiveColumnScanner {
    patterns: Vec<Regex>,
}

impl SensitiveColumnScanner {
    /// Build a scanner from regex patterns, matched case-insensitively
    /// anywhere in the column name.
    pub fn new<I, S>(patterns: I) -> AuditResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("(?i){}", p))
                    .map_err(|e| AuditError::catalog(format!("invalid sensitive pattern '{}': {}", p, e)))
            })
            .collect::<AuditResult<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// The default pattern set.
    pub fn with_defaults() -> Self {
        // The default patterns are plain words; compiling them cannot fail.
        Self::new(DEFAULT_SENSITIVE_PATTERNS).unwrap_or(Self {
            patterns: Vec::new(),
        })
    }

    fn matches(&self, column: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(column))
    }

    /// Scan discovered grants for secret-shaped columns readable by the
    /// public-facing roles. One issue per column, listing every grantee.
    pub fn scan(&self, grants: &[ColumnGrant]) -> Vec<LintIssue> {
        let mut by_column: Vec<(String, Vec<String>)> = Vec::new();

        for grant in grants {
            if !self.matches(&grant.column) {
                continue;
            }
            let subject = format!("{}.{}.{}", grant.schema, grant.table, grant.column);
            match by_column.iter_mut().find(|(s, _)| *s == subject) {
                Some((_, grantees)) => {
                    if !grantees.contains(&grant.grantee) {
                        grantees.push(grant.grantee.clone());
                    }
                }
                None => by_column.push((subject, vec![grant.grantee.clone()])),
            }
        }

        by_column
            .into_iter()
            .map(|(subject, grantees)| LintIssue {
                severity: Severity::High,
                check: CheckId::SensitiveColumnExposed,
                message: format!(
                    "column {} looks sensitive and is readable by {}",
                    subject,
                    grantees.join(", ")
                ),
                subject,
                expression: None,
                fix_hint: "revoke SELECT on the column (or move it to a protected table) and expose it through a security-definer function if needed".to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grant(column: &str, grantee: &str) -> ColumnGrant {
        ColumnGrant {
            schema: "public".to_string(),
            table: "users".to_string(),
            column: column.to_string(),
            grantee: grantee.to_string(),
        }
    }

    #[test]
    fn test_password_hash_flagged_for_anon() {
        let scanner = SensitiveColumnScanner::with_defaults();
        let issues = scanner.scan(&[grant("password_hash", "anon")]);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].check, CheckId::SensitiveColumnExposed);
        assert!(issues[0].subject.contains("password_hash"));
    }

    #[test]
    fn test_grantees_collapse_into_one_issue() {
        let scanner = SensitiveColumnScanner::with_defaults();
        let issues = scanner.scan(&[
            grant("api_key", "anon"),
            grant("api_key", "authenticated"),
        ]);

        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("anon"));
        assert!(issues[0].message.contains("authenticated"));
    }

    #[test]
    fn test_benign_columns_pass() {
        let scanner = SensitiveColumnScanner::with_defaults();
        let issues = scanner.scan(&[grant("title", "anon"), grant("created_at", "PUBLIC")]);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let scanner = SensitiveColumnScanner::with_defaults();
        let issues = scanner.scan(&[grant("StripeToken", "authenticated")]);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_custom_patterns() {
        let scanner = SensitiveColumnScanner::new(["internal_note"]).unwrap();
        let issues = scanner.scan(&[grant("internal_notes", "anon")]);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(SensitiveColumnScanner::new(["("]).is_err());
    }
}
