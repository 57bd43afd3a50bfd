//! Command implementations.

pub mod audit;
pub mod coverage;
pub mod diff;
pub mod init;
pub mod lint;
pub mod snapshot;
pub mod test;

use tracing::debug;

use rowshield_audit::{Discovery, PgIntrospector, SchemaFilter, discover};
use rowshield_config::{PolicyConfig, RunOptions};
use rowshield_postgres::{ConnectionContext, PgConfig};
use rowshield_probe::{CancelFlag, Orchestrator, TestResults};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use crate::output;

/// Resolve the database URL or explain how to supply one.
pub(crate) fn database_url(cli: &Cli) -> CliResult<&str> {
    cli.database_url.as_deref().ok_or_else(|| {
        CliError::Command(
            "no database URL; pass --database-url or set DATABASE_URL".to_string(),
        )
    })
}

/// Open a vetted connection with the pool sized to the run.
pub(crate) async fn connect(cli: &Cli, pool_capacity: usize) -> CliResult<ConnectionContext> {
    let config = PgConfig::from_url(database_url(cli)?)?;
    debug!(target = %config.display_target(), "connecting");
    Ok(ConnectionContext::establish(config, pool_capacity).await?)
}

/// Load the policy plan named by --config.
pub(crate) fn load_policy(cli: &Cli) -> CliResult<PolicyConfig> {
    if !cli.config.exists() {
        return Err(CliError::Command(format!(
            "policy file '{}' not found; run `rowshield init` to create one",
            cli.config.display()
        )));
    }
    Ok(PolicyConfig::load(&cli.config)?)
}

/// Discover the catalog through the vetted pool.
pub(crate) async fn run_discovery(
    ctx: &ConnectionContext,
    include_system_schemas: bool,
) -> CliResult<Discovery> {
    let introspector = PgIntrospector::new(ctx.pool().clone());
    let filter = SchemaFilter::from_include_system(include_system_schemas);
    Ok(discover(&introspector, filter).await?)
}

/// Run the plan's probes with Ctrl-C wired to cooperative cancellation.
pub(crate) async fn run_probes(
    ctx: &ConnectionContext,
    config: &PolicyConfig,
    discovery: &Discovery,
    options: &RunOptions,
) -> CliResult<TestResults> {
    let cancel = CancelFlag::new();

    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warn("cancellation requested; letting in-flight probes roll back");
            signal_cancel.cancel();
        }
    });

    let orchestrator = Orchestrator::new(ctx);
    let results = orchestrator.run(config, discovery, options, &cancel).await?;

    signal_task.abort();
    Ok(results)
}

/// Print aggregate counts for a probe run.
pub(crate) fn print_run_summary(results: &TestResults) {
    output::newline();
    output::section("Summary");
    output::kv("total", &results.total.to_string());
    output::kv("passed", &results.passed.to_string());
    output::kv("failed", &results.failed.to_string());
    output::kv("errored", &results.errored.to_string());
    output::kv("skipped", &results.skipped.to_string());
    output::kv("duration", &format!("{}ms", results.duration_ms));
}
