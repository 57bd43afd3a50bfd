//! `rowshield lint` - static policy checks only.

use rowshield_audit::lint_policies;

use crate::cli::{Cli, LintArgs};
use crate::error::CliResult;
use crate::output;

/// Run the lint command
pub async fn run(cli: &Cli, args: &LintArgs) -> CliResult<i32> {
    let ctx = super::connect(cli, 2).await?;

    if !cli.json {
        output::header("Policy Lint");
        output::kv("database", &ctx.pool().config().display_target());
        output::newline();
    }

    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;
    ctx.close();

    let results = lint_policies(&discovery.tables);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(if results.has_blocking_issues() { 1 } else { 0 });
    }

    output::kv("policies checked", &results.policies_checked.to_string());
    output::newline();

    if results.issues.is_empty() {
        output::success("no lint issues");
        return Ok(0);
    }

    for issue in &results.issues {
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
        output::newline();
    }

    if results.has_blocking_issues() {
        output::error("lint found CRITICAL or HIGH issues");
        Ok(1)
    } else {
        output::warn("lint found issues below the blocking threshold");
        Ok(0)
    }
}
