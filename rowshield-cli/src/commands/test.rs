//! `rowshield test` - probe declared scenarios and compare against
//! expectations.

use rowshield_config::RunOptions;

use crate::cli::{Cli, TestArgs};
use crate::error::CliResult;
use crate::output;

/// Run the test command
pub async fn run(cli: &Cli, args: &TestArgs) -> CliResult<i32> {
    let mut options = RunOptions::new(args.parallelism)
        .include_system_schemas(args.include_system_schemas);
    if let Some(table) = &args.table {
        options = options.target_table(table.parse()?);
    }
    if let Some(user) = &args.as_user {
        options = options.as_user(user);
    }

    let config = super::load_policy(cli)?;
    let ctx = super::connect(cli, options.parallelism()).await?;
    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;

    if !cli.json {
        output::header("RLS Test Run");
        output::kv("database", &ctx.pool().config().display_target());
        output::kv("policy file", &cli.config.display().to_string());
        output::kv("parallelism", &options.parallelism().to_string());
        if let Some(user) = &args.as_user {
            output::kv("as user", user);
        }
        output::newline();
    }

    let results = super::run_probes(&ctx, &config, &discovery, &options).await?;
    ctx.close();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(if results.all_clear() { 0 } else { 1 });
    }

    for result in &results.results {
        output::result_line(result);
    }

    for table in &results.rls_disabled_tables {
        output::newline();
        output::warn(&format!(
            "CRITICAL: {} has row-level security disabled; it was reported, not probed",
            table
        ));
    }

    let fixes: Vec<String> = results
        .failures()
        .filter_map(output::suggested_fix)
        .collect();
    if !fixes.is_empty() {
        output::newline();
        output::section("Suggested fixes");
        for fix in fixes {
            output::newline();
            for line in fix.lines() {
                output::dim(&format!("  {}", line));
            }
        }
    }

    super::print_run_summary(&results);

    if results.all_clear() {
        output::newline();
        output::success("all probes matched their expectations");
        Ok(0)
    } else {
        output::newline();
        output::error(&format!(
            "{} probe(s) failed, {} errored",
            results.failed, results.errored
        ));
        Ok(1)
    }
}
