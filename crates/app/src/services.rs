//! Use-cases built on top of the [`PageSource`](crate::ports::PageSource) port.

pub mod infinite_query;
pub mod query_cache;
pub mod single_query;
