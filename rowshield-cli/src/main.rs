//! rowshield - audit and test Row-Level-Security on PostgreSQL.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rowshield_cli::cli::{Cli, Command};
use rowshield_cli::error::CliResult;
use rowshield_cli::{commands, output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::newline();
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> CliResult<i32> {
    match &cli.command {
        Command::Init(args) => commands::init::run(&cli, args).await,
        Command::Test(args) => commands::test::run(&cli, args).await,
        Command::Audit(args) => commands::audit::run(&cli, args).await,
        Command::Lint(args) => commands::lint::run(&cli, args).await,
        Command::Coverage(args) => commands::coverage::run(&cli, args).await,
        Command::Snapshot(args) => commands::snapshot::run(&cli, args).await,
        Command::Diff(args) => commands::diff::run(&cli, args).await,
    }
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "rowshield=warn",
        1 => "rowshield=info",
        _ => "rowshield=debug",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
