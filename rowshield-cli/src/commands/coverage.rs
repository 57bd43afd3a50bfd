//! `rowshield coverage` - probe and render the per-table access matrix.

use rowshield_config::{Op, RunOptions};
use rowshield_probe::CoverageReport;

use crate::cli::{Cli, CoverageArgs};
use crate::error::CliResult;
use crate::output;

/// Run the coverage command
pub async fn run(cli: &Cli, args: &CoverageArgs) -> CliResult<i32> {
    let mut options = RunOptions::new(args.parallelism)
        .include_system_schemas(args.include_system_schemas);
    if let Some(table) = &args.table {
        options = options.target_table(table.parse()?);
    }

    let config = super::load_policy(cli)?;
    let ctx = super::connect(cli, options.parallelism()).await?;
    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;

    if !cli.json {
        output::header("RLS Coverage");
        output::kv("database", &ctx.pool().config().display_target());
        output::newline();
    }

    let results = super::run_probes(&ctx, &config, &discovery, &options).await?;
    ctx.close();

    let report = CoverageReport::build(&discovery, &results);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(if results.all_clear() { 0 } else { 1 });
    }

    for table in &report.tables {
        let rls_label = if table.rls_enabled {
            "rls on".to_string()
        } else {
            "RLS OFF".to_string()
        };
        output::section(&format!("{}  ({})", table.table_key, rls_label));

        print_role_row("anonymous", &table.access.anonymous);
        print_role_row("authenticated", &table.access.authenticated);

        if let Some(warning) = &table.warning {
            output::warn(warning);
        }
        output::newline();
    }

    super::print_run_summary(&results);
    Ok(if results.all_clear() { 0 } else { 1 })
}

fn print_role_row(
    role: &str,
    cells: &std::collections::BTreeMap<Op, rowshield_probe::OutcomeKind>,
) {
    if cells.is_empty() {
        output::dim(&format!("  {:14} (not probed)", role));
        return;
    }

    let rendered: Vec<String> = Op::ALL
        .iter()
        .filter_map(|op| {
            cells
                .get(op)
                .map(|kind| format!("{}:{}", op, output::style_outcome(*kind)))
        })
        .collect();

    println!("  {:14} {}", role, rendered.join("  "));
}
