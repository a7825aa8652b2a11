use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use erudite::cli::{Cli, Commands};

const DEFAULT_FILTER: &str = "erudite=info,erudite_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            output,
            format,
            overwrite,
            jobs,
        } => erudite::cli::extract::run(&input, output.as_deref(), &format, overwrite, jobs).await,
        Commands::Load {
            input,
            target,
            schema,
            format,
            key,
        } => erudite::cli::load::run(&input, &target, &schema, &format, key).await,
    }
}
