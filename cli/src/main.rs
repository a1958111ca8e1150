//! `docchat`: terminal chat over an indexed document collection.

mod cli;
mod repl;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;

    match &args.query {
        Some(query) => repl::run_once(&config, query, args.show_sources).await,
        None => repl::run_interactive(&config, args.show_sources).await,
    }
}
