//! # pagewise — command-line client
//!
//! Composition root that wires the HTTP adapter into the pagination
//! services.
//!
//! ## Responsibilities
//! - Parse configuration (CLI args, env vars, config file)
//! - Construct the `reqwest` page source (adapter)
//! - Construct queries, injecting the page source via the port trait
//! - Stream fetched records to the output as JSON lines
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no pagination logic belongs here.

pub mod cli;
pub mod config;

use std::io::Write;

use anyhow::Context;
use serde_json::Value;

use pagewise_adapter_http_reqwest::HttpPageSource;
use pagewise_app::resources;
use pagewise_app::services::infinite_query::{InfiniteQuery, QuerySpec};
use pagewise_app::services::query_cache::QueryCache;
use pagewise_app::services::single_query::SingleQuery;
use pagewise_domain::page::{PageSize, ResourcePath};
use pagewise_domain::validation::validate_phone_number;

use crate::cli::{Command, PagingArgs};
use crate::config::Config;

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Requests that returned a page (or record).
    pub pages: usize,
    /// Records written to the output.
    pub records: usize,
    /// Whether the resource was read to its end.
    pub exhausted: bool,
}

/// Execute `command` against the configured backend, writing records to `out`.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or rejects a request,
/// if arguments are malformed, or if writing to `out` fails.
pub async fn run(command: Command, config: &Config, out: &mut impl Write) -> anyhow::Result<Summary> {
    match command {
        Command::Fetch { resource, paging } => {
            let resource = ResourcePath::new(&resource).context("invalid resource path")?;
            let spec = QuerySpec::new(resource, &paging.filters())
                .with_page_size(page_size(&paging, config)?);
            fetch_pages(&spec, &paging, config, out).await
        }
        Command::Messages { thread_id, paging } => {
            let filters = paging.filters();
            let mut spec = resources::messages(&thread_id, &filters).context("invalid thread id")?;
            if paging.page_size.is_some() || filters.get("limit").is_none() {
                spec = spec.with_page_size(page_size(&paging, config)?);
            }
            if !spec.is_enabled() {
                anyhow::bail!("thread id must not be empty");
            }
            fetch_pages(&spec, &paging, config, out).await
        }
        Command::Agent { id } => {
            let path = resources::worker_agent(&id).context("agent id must not be empty")?;
            let source = HttpPageSource::new(&config.backend)?;
            let query: SingleQuery<_, Value> = SingleQuery::new(source, Some(path));
            let record = query.fetch().await?;
            let records = match record {
                Some(record) => {
                    writeln!(out, "{record}")?;
                    1
                }
                None => 0,
            };
            Ok(Summary {
                pages: records,
                records,
                exhausted: true,
            })
        }
        Command::CheckPhone { number } => {
            let errors = validate_phone_number(&number).err().unwrap_or_default();
            for error in &errors {
                writeln!(out, "{}: {}", error.field, error.message)?;
            }
            if errors.is_empty() {
                writeln!(out, "ok")?;
            }
            Ok(Summary {
                pages: 0,
                records: errors.len(),
                exhausted: true,
            })
        }
    }
}

fn page_size(paging: &PagingArgs, config: &Config) -> anyhow::Result<PageSize> {
    match paging.page_size {
        Some(size) => PageSize::new(size).context("invalid --page-size"),
        None => Ok(config.page_size()),
    }
}

async fn fetch_pages(
    spec: &QuerySpec,
    paging: &PagingArgs,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<Summary> {
    let source = HttpPageSource::new(&config.backend)?;
    let cache: QueryCache<_, Value> = QueryCache::new(source);
    let query = cache.subscribe(spec);

    let pages = query
        .fetch_up_to(paging.max_pages.unwrap_or(usize::MAX))
        .await
        .with_context(|| format!("failed to fetch {}", spec.key()))?;
    let records = write_records(&query, out)?;
    let exhausted = !query.has_next_page();

    tracing::info!(query = %spec.key(), pages, records, exhausted, "fetch finished");
    cache.teardown();
    Ok(Summary {
        pages,
        records,
        exhausted,
    })
}

fn write_records<S>(query: &InfiniteQuery<S, Value>, out: &mut impl Write) -> anyhow::Result<usize>
where
    S: pagewise_app::ports::PageSource,
{
    query.with_pages(|pages| -> anyhow::Result<usize> {
        let mut written = 0;
        for record in pages.iter().flat_map(|page| page.items.iter()) {
            writeln!(out, "{record}")?;
            written += 1;
        }
        Ok(written)
    })
}
