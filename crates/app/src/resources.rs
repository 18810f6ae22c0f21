//! Resource presets used by the desktop shell.

use pagewise_domain::error::ValidationError;
use pagewise_domain::filter::Filters;
use pagewise_domain::page::{PageSize, ResourcePath};

use crate::services::infinite_query::QuerySpec;

/// Shown when a message page fails to load.
pub const MESSAGES_ERROR: &str = "Failed to fetch messages.";

/// Paginated messages of a thread.
///
/// The page size comes from the caller's `limit` filter when it is a
/// positive integer, and defaults otherwise; the filter itself is never
/// forwarded. The query is disabled while `thread_id` is empty.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the resulting path is malformed.
pub fn messages(thread_id: &str, filters: &Filters) -> Result<QuerySpec, ValidationError> {
    let thread_id = thread_id.trim();
    let resource = ResourcePath::new(format!("threads/{thread_id}/messages"))?;
    Ok(QuerySpec::new(resource, filters)
        .with_page_size(page_size_from(filters))
        .with_enabled(!thread_id.is_empty())
        .with_error_message(MESSAGES_ERROR))
}

/// Path of a single worker agent, or `None` (disabled) when `id` is empty.
#[must_use]
pub fn worker_agent(id: &str) -> Option<ResourcePath> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    ResourcePath::new(format!("worker-agent/{id}")).ok()
}

/// Page size requested through a `limit` filter, falling back to the default.
#[must_use]
pub fn page_size_from(filters: &Filters) -> PageSize {
    filters
        .get("limit")
        .and_then(|limit| limit.parse::<u32>().ok())
        .and_then(|limit| PageSize::new(limit).ok())
        .unwrap_or_default()
}
