use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod config;
mod error;
mod expand;
mod parser;
mod provider;
mod runner;
mod telemetry;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("taskgen=debug")
    } else {
        EnvFilter::new("taskgen=warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Expand(args) => cli::expand::execute(args).await,
        Commands::Generate(args) => cli::generate::execute(args).await,
        Commands::Parse(args) => cli::parse::execute(args),
        Commands::Models(args) => cli::models::execute(args),
        Commands::Schema(args) => cli::schema::execute(args),
    }
}
