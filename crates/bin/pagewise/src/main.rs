//! # pagewise — command-line entry point
//!
//! Parses arguments, loads configuration, initialises logging and hands
//! off to [`pagewise::run`].

use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pagewise::cli::Cli;
use pagewise::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(base_url = %config.backend.base_url, "configuration loaded");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    pagewise::run(cli.command, &config, &mut out).await?;
    out.flush()?;

    Ok(())
}
