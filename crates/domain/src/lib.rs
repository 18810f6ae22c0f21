//! # pagewise-domain
//!
//! Pure domain model for the pagewise fetch core.
//!
//! ## Responsibilities
//! - Foundational types: resource paths, page sizes, cursors, query keys
//! - Define **Filters** and their normalization (`order`/`limit`/`offset`
//!   belong to the adapter, never to the caller)
//! - Define **Page Requests** and **Pages**
//! - Define the **pagination state machine** and its page-size heuristics
//! - Field-level **validation** rules for profile and security forms
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod filter;
pub mod page;
pub mod pagination;
pub mod validation;
