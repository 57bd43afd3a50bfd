//! `rowshield diff` - compare snapshots to catch regressions and leaks.

use rowshield_config::RunOptions;
use rowshield_snapshot::{PolicySnapshot, SnapshotStore, diff};

use crate::cli::{Cli, DiffArgs};
use crate::error::CliResult;
use crate::output;

/// Run the diff command
pub async fn run(cli: &Cli, args: &DiffArgs) -> CliResult<i32> {
    let previous = SnapshotStore::new(&args.previous).load().await?;

    let current = match &args.current {
        Some(path) => SnapshotStore::new(path).load().await?,
        None => probe_current(cli, args).await?,
    };

    let result = diff(&previous, &current);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(if result.leaks.is_empty() { 0 } else { 1 });
    }

    output::header("Snapshot Diff");
    output::kv("previous", &args.previous.display().to_string());
    output::kv(
        "current",
        &args
            .current
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "live database".to_string()),
    );
    output::newline();

    if result.is_identical() {
        output::success("no behavioral changes");
        return Ok(0);
    }

    if !result.leaks.is_empty() {
        output::section("Leaks (DENY became ALLOW)");
        for leak in &result.leaks {
            output::error(&leak.describe());
        }
        output::newline();
    }

    if !result.regressions.is_empty() {
        output::section("Regressions");
        for regression in &result.regressions {
            output::warn(&regression.describe());
        }
        output::newline();
    }

    if !result.newly_introduced.is_empty() {
        output::section("Newly introduced");
        for entry in &result.newly_introduced {
            output::list_item(&entry.describe());
        }
        output::newline();
    }

    output::info(&result.summary());

    // Leaks drive the exit signal; regressions and new cells are
    // informational.
    Ok(if result.leaks.is_empty() { 0 } else { 1 })
}

/// Probe the live database to build the current-side snapshot.
async fn probe_current(cli: &Cli, args: &DiffArgs) -> CliResult<PolicySnapshot> {
    let options = RunOptions::new(args.parallelism)
        .include_system_schemas(args.include_system_schemas);

    let config = super::load_policy(cli)?;
    let ctx = super::connect(cli, options.parallelism()).await?;
    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;

    let results = super::run_probes(&ctx, &config, &discovery, &options).await?;
    let database = ctx.pool().config().display_target();
    ctx.close();

    Ok(PolicySnapshot::capture(&results, database))
}
