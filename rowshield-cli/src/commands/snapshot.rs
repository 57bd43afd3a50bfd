//! `rowshield snapshot` - save and inspect probe-matrix snapshots.

use rowshield_config::RunOptions;
use rowshield_snapshot::{PolicySnapshot, SnapshotStore};

use crate::cli::{Cli, SnapshotArgs, SnapshotSaveArgs, SnapshotShowArgs, SnapshotSubcommand};
use crate::error::CliResult;
use crate::output;

/// Run the snapshot command
pub async fn run(cli: &Cli, args: &SnapshotArgs) -> CliResult<i32> {
    match &args.command {
        SnapshotSubcommand::Save(save_args) => run_save(cli, save_args).await,
        SnapshotSubcommand::Show(show_args) => run_show(cli, show_args).await,
    }
}

async fn run_save(cli: &Cli, args: &SnapshotSaveArgs) -> CliResult<i32> {
    let options = RunOptions::new(args.parallelism)
        .include_system_schemas(args.include_system_schemas);

    let config = super::load_policy(cli)?;
    let ctx = super::connect(cli, options.parallelism()).await?;
    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;

    if !cli.json {
        output::header("Snapshot");
        output::kv("database", &ctx.pool().config().display_target());
        output::kv("output", &args.output.display().to_string());
        output::newline();
    }

    let results = super::run_probes(&ctx, &config, &discovery, &options).await?;
    let database = ctx.pool().config().display_target();
    ctx.close();

    let snapshot = PolicySnapshot::capture(&results, database);
    let store = SnapshotStore::new(&args.output);
    store.save(&snapshot).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        output::success(&format!(
            "wrote {} cells to {}",
            snapshot.cell_count(),
            args.output.display()
        ));
        if results.errored > 0 {
            output::warn(&format!(
                "{} probe(s) errored; their cells record ERROR",
                results.errored
            ));
        }
    }

    Ok(if results.errored > 0 { 1 } else { 0 })
}

async fn run_show(cli: &Cli, args: &SnapshotShowArgs) -> CliResult<i32> {
    let store = SnapshotStore::new(&args.path);
    let snapshot = store.load().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(0);
    }

    output::header("Snapshot");
    output::kv("file", &args.path.display().to_string());
    output::kv("database", &snapshot.database);
    output::kv("taken at", &snapshot.taken_at.to_rfc3339());
    output::kv("cells", &snapshot.cell_count().to_string());
    output::newline();

    for (table, scenarios) in &snapshot.matrix {
        output::section(table);
        for (scenario, ops) in scenarios {
            let rendered: Vec<String> = ops
                .iter()
                .map(|(op, cell)| format!("{}:{}", op, output::style_outcome(cell.result)))
                .collect();
            println!("  {:20} {}", scenario, rendered.join("  "));
        }
        output::newline();
    }

    Ok(0)
}
