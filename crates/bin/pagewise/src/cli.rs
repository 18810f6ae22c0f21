//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pagewise_domain::filter::Filters;

#[derive(Debug, Parser)]
#[command(name = "pagewise", version, about = "Walk paginated REST resources")]
pub struct Cli {
    /// Config file (defaults to ./pagewise.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch pages of any resource and print one JSON record per line.
    Fetch {
        /// Resource path relative to the base URL (e.g. `agents`).
        resource: String,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Fetch the messages of a thread.
    ///
    /// Page size is `--page-size`, then a `limit` filter, then the
    /// configured default.
    Messages {
        thread_id: String,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Fetch a single worker agent.
    Agent { id: String },
    /// Check a phone number against the profile form rules.
    CheckPhone { number: String },
}

#[derive(Debug, Clone, clap::Args)]
pub struct PagingArgs {
    /// Query filter, repeatable. `order`, `limit` and `offset` are ignored.
    #[arg(short, long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Items per page (overrides the configured page size).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Stop after this many pages.
    #[arg(long)]
    pub max_pages: Option<usize>,
}

impl PagingArgs {
    #[must_use]
    pub fn filters(&self) -> Filters {
        self.filters.iter().cloned().collect()
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
