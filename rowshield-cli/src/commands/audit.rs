//! `rowshield audit` - static audit of policies, RLS flags and grants.

use rowshield_audit::{AuditReport, SchemaFilter, SensitiveColumnScanner};

use crate::cli::{AuditArgs, Cli};
use crate::error::CliResult;
use crate::output;

/// Run the audit command
pub async fn run(cli: &Cli, args: &AuditArgs) -> CliResult<i32> {
    let ctx = super::connect(cli, 2).await?;

    if !cli.json {
        output::header("RLS Audit");
        output::kv("database", &ctx.pool().config().display_target());
        output::newline();
    }

    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;

    let introspector = rowshield_audit::PgIntrospector::new(ctx.pool().clone());
    let grants = rowshield_audit::Introspector::column_grants(
        &introspector,
        SchemaFilter::from_include_system(args.include_system_schemas),
    )
    .await?;

    ctx.close();

    let scanner = SensitiveColumnScanner::with_defaults();
    let report = AuditReport::build(&discovery, &grants, &scanner);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(if report.has_blocking_issues() { 1 } else { 0 });
    }

    output::kv("tables scanned", &report.tables_scanned.to_string());
    output::kv("buckets scanned", &report.buckets_scanned.to_string());
    output::kv(
        "policies checked",
        &report.results.policies_checked.to_string(),
    );
    output::newline();

    if report.results.issues.is_empty() {
        output::success("no issues found");
        return Ok(0);
    }

    for issue in &report.results.issues {
        println!(
            "  {} {} {}",
            output::style_severity(issue.severity),
            issue.check,
            issue.subject
        );
        println!("      {}", issue.message);
        if let Some(expression) = &issue.expression {
            output::dim(&format!("      expression: {}", expression));
        }
        output::dim(&format!("      fix: {}", issue.fix_hint));
        output::newline();
    }

    output::section("Issue counts");
    for (severity, count) in &report.results.counts {
        output::kv(&severity.to_string(), &count.to_string());
    }

    if report.has_blocking_issues() {
        output::newline();
        output::error("audit found CRITICAL or HIGH issues");
        Ok(1)
    } else {
        output::newline();
        output::warn("audit found issues below the blocking threshold");
        Ok(0)
    }
}
