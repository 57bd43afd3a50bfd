//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// rowshield - audit and test Row-Level-Security on PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "rowshield")]
#[command(version)]
#[command(about = "Audit and test Row-Level-Security on PostgreSQL/Supabase", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Path to the policy file
    #[arg(short, long, global = true, default_value = "rowshield.yaml")]
    pub config: PathBuf,

    /// Emit machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter policy file seeded from the live database
    Init(InitArgs),

    /// Probe every declared scenario and compare against expectations
    Test(TestArgs),

    /// Full static audit: policies, RLS flags, sensitive columns
    Audit(AuditArgs),

    /// Static policy lint only
    Lint(LintArgs),

    /// Probe and render the per-table access matrix
    Coverage(CoverageArgs),

    /// Save or inspect probe-matrix snapshots
    Snapshot(SnapshotArgs),

    /// Compare a snapshot against another snapshot or the live database
    Diff(DiffArgs),
}

/// Arguments for the `init` command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the policy file (defaults to --config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing policy file
    #[arg(long)]
    pub force: bool,

    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,
}

/// Arguments for the `test` command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Restrict the run to one table (schema.name)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,

    /// Probe parallelism (clamped to 1-10)
    #[arg(short, long, default_value_t = rowshield_config::DEFAULT_PARALLELISM)]
    pub parallelism: usize,

    /// Probe as a real auth.users record (email or id) instead of the
    /// plan's scenarios
    #[arg(long)]
    pub as_user: Option<String>,
}

/// Arguments for the `audit` command
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,
}

/// Arguments for the `lint` command
#[derive(Args, Debug)]
pub struct LintArgs {
    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,
}

/// Arguments for the `coverage` command
#[derive(Args, Debug)]
pub struct CoverageArgs {
    /// Restrict the run to one table (schema.name)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,

    /// Probe parallelism (clamped to 1-10)
    #[arg(short, long, default_value_t = rowshield_config::DEFAULT_PARALLELISM)]
    pub parallelism: usize,
}

/// Arguments for the `snapshot` command
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotSubcommand,
}

/// Snapshot subcommands
#[derive(Subcommand, Debug)]
pub enum SnapshotSubcommand {
    /// Probe the database and write the matrix to a snapshot file
    Save(SnapshotSaveArgs),

    /// Print a snapshot file
    Show(SnapshotShowArgs),
}

/// Arguments for `snapshot save`
#[derive(Args, Debug)]
pub struct SnapshotSaveArgs {
    /// Snapshot file to write
    #[arg(short, long, default_value = "rowshield-snapshot.json")]
    pub output: PathBuf,

    /// Include tables outside the public schema
    #[arg(long)]
    pub include_system_schemas: bool,

    /// Probe parallelism (clamped to 1-10)
    #[arg(short, long, default_value_t = rowshield_config::DEFAULT_PARALLELISM)]
    pub parallelism: usize,
}

/// Arguments for `snapshot show`
#[derive(Args, Debug)]
pub struct SnapshotShowArgs {
    /// Snapshot file to print
    #[arg(default_value = "rowshield-snapshot.json")]
    pub path: PathBuf,
}

/// Arguments for the `diff` command
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Previous snapshot file
    pub previous: PathBuf,

    /// Current snapshot file; omitted means "probe the live database"
    pub current: Option<PathBuf>,

    /// Include tables outside the public schema (live-probe side)
    #[arg(long)]
    pub include_system_schemas: bool,

    /// Probe parallelism for the live-probe side (clamped to 1-10)
    #[arg(short, long, default_value_t = rowshield_config::DEFAULT_PARALLELISM)]
    pub parallelism: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_test_command() {
        let cli = Cli::try_parse_from([
            "rowshield",
            "--database-url",
            "postgres://localhost/app",
            "test",
            "--table",
            "public.todos",
            "--parallelism",
            "2",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Test(_)));
        if let Command::Test(args) = cli.command {
            assert_eq!(args.table.as_deref(), Some("public.todos"));
            assert_eq!(args.parallelism, 2);
        }
    }

    #[test]
    fn test_parse_diff_with_live_side() {
        let cli = Cli::try_parse_from(["rowshield", "diff", "baseline.json"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert!(args.current.is_none());
        } else {
            panic!("expected diff command");
        }
    }
}
