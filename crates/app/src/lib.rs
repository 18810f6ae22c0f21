//! # pagewise-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `PageSource` — fetch one page (or one record) of a remote resource
//! - Define **driving/inbound** use-cases:
//!   - `InfiniteQuery` — a subscription over a paginated resource
//!   - `QueryCache` — session-scoped context owning every query's pages
//!   - `SingleQuery` — cached fetch of a single record
//! - Provide the resource presets the desktop shell uses (`resources`)
//!
//! ## Dependency rule
//! Depends on `pagewise-domain` only (plus `tokio::sync` for snapshots).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;
pub mod resources;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
