//! Styled terminal output utilities.

use owo_colors::OwoColorize;

use rowshield_audit::Severity;
use rowshield_config::{Expectation, Op};
use rowshield_probe::{OutcomeKind, TestResult};

/// Print a header/title
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "─".repeat(text.len()).dimmed());
    println!();
}

/// Print a section header
pub fn section(text: &str) {
    println!("{}", text.bold().white());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a list item
pub fn list_item(text: &str) {
    println!("  {} {}", "•".dimmed(), text);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Print dimmed text
pub fn dim(text: &str) {
    println!("{}", text.dimmed());
}

/// Style an outcome for matrix cells and result lines.
pub fn style_outcome(kind: OutcomeKind) -> String {
    match kind {
        OutcomeKind::Allow => kind.as_str().green().to_string(),
        OutcomeKind::Deny => kind.as_str().red().to_string(),
        OutcomeKind::Error => kind.as_str().magenta().to_string(),
        OutcomeKind::Skipped => kind.as_str().yellow().to_string(),
    }
}

/// Style a lint severity.
pub fn style_severity(severity: Severity) -> String {
    match severity {
        Severity::Critical => severity.to_string().red().bold().to_string(),
        Severity::High => severity.to_string().red().to_string(),
        Severity::Medium => severity.to_string().yellow().to_string(),
        Severity::Low => severity.to_string().dimmed().to_string(),
    }
}

/// Print one probe result line.
pub fn result_line(result: &TestResult) {
    let marker = if result.passed {
        "✔".green().to_string()
    } else {
        match result.outcome_kind() {
            OutcomeKind::Skipped => "↷".yellow().to_string(),
            OutcomeKind::Error => "!".magenta().bold().to_string(),
            _ => "✖".red().bold().to_string(),
        }
    };

    let detail = if result.passed {
        style_outcome(result.outcome_kind())
    } else {
        format!(
            "expected {}, got {}",
            result.expected,
            style_outcome(result.outcome_kind())
        )
    };

    println!(
        "  {} {} / {} / {} {} {}",
        marker,
        result.table_key,
        result.scenario,
        result.op,
        detail,
        format!("({}ms)", result.duration_ms).dimmed()
    );

    if let Some(error) = &result.error {
        if !result.passed {
            println!("      {}", error.dimmed());
        }
    }
}

/// A corrective statement for a failing probe, for the operator to adapt.
pub fn suggested_fix(result: &TestResult) -> Option<String> {
    let (schema_table, role) = (
        result.table_key.as_str(),
        result.session_role.as_str(),
    );

    // Storage buckets are managed through storage policies; a generic
    // REVOKE would be wrong there.
    if schema_table.starts_with("storage:") {
        return None;
    }

    match (result.expected, result.outcome_kind()) {
        // Something is reachable that should not be: tighten.
        (Expectation::Deny, OutcomeKind::Allow) => Some(match result.op {
            Op::Select => format!(
                "-- {} can read {}; scope the SELECT policy:\nCREATE POLICY {}_select ON {} FOR SELECT TO {} USING (auth.uid() = user_id);",
                role,
                schema_table,
                sanitized(schema_table),
                schema_table,
                role
            ),
            Op::Insert => format!(
                "-- {} can write {}; add a WITH CHECK clause:\nCREATE POLICY {}_insert ON {} FOR INSERT TO {} WITH CHECK (auth.uid() = user_id);",
                role,
                schema_table,
                sanitized(schema_table),
                schema_table,
                role
            ),
            Op::Update | Op::Delete => format!(
                "-- {} can modify {}; restrict the {} policy:\nREVOKE {} ON {} FROM {};",
                role,
                schema_table,
                result.op,
                result.op,
                schema_table,
                role
            ),
        }),
        // Something expected to work is blocked: loosen or grant.
        (Expectation::Allow, OutcomeKind::Deny) => Some(format!(
            "-- {} cannot {} {}; check the policy's USING/WITH CHECK and the role's grant:\nGRANT {} ON {} TO {};",
            role, result.op, schema_table, result.op, schema_table, role
        )),
        _ => None,
    }
}

fn sanitized(table_key: &str) -> String {
    table_key.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowshield_config::Expectation;
    use rowshield_probe::{ProbeObservation, ProbeOutcome};

    fn leaked_select() -> TestResult {
        TestResult::evaluate(
            "public.leaky",
            "anonymous",
            "anon",
            Op::Select,
            Expectation::Deny,
            ProbeObservation {
                outcome: ProbeOutcome::Allow,
                detail: None,
            },
            1,
        )
    }

    #[test]
    fn test_suggested_fix_for_leak() {
        let fix = suggested_fix(&leaked_select()).unwrap();
        assert!(fix.contains("public.leaky"));
        assert!(fix.contains("CREATE POLICY"));
    }

    #[test]
    fn test_no_fix_for_passing_result() {
        let mut result = leaked_select();
        result.expected = Expectation::Allow;
        result.passed = true;
        assert!(suggested_fix(&result).is_none());
    }

    #[test]
    fn test_no_fix_for_storage_targets() {
        let mut result = leaked_select();
        result.table_key = "storage:avatars".to_string();
        assert!(suggested_fix(&result).is_none());
    }
}
