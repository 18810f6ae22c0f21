//! Page requests, page results, and the values they are built from.

use std::fmt;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::filter::Filters;

/// Page size used when the caller does not configure one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// UTC timestamp recorded when a page arrives.
pub type Timestamp = DateTime<Utc>;

/// Slash-separated resource path relative to the backend base URL
/// (e.g. `threads/42/messages`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Parse a resource path, trimming leading and trailing slashes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyResourcePath`] when nothing is left
    /// after trimming.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = path.as_ref().trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyResourcePath);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maximum number of items the backend returns per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageSize(NonZeroU32);

impl PageSize {
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroPageSize`] when `size` is zero.
    pub fn new(size: u32) -> Result<Self, ValidationError> {
        NonZeroU32::new(size)
            .map(Self)
            .ok_or(ValidationError::ZeroPageSize)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Page size as a slice length.
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0.get()).unwrap_or(usize::MAX)
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_PAGE_LIMIT).unwrap_or(NonZeroU32::MIN))
    }
}

impl TryFrom<u32> for PageSize {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageSize> for u32 {
    fn from(size: PageSize) -> Self {
        size.get()
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Offset at which a page begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(u64);

impl Cursor {
    /// The first page always starts here.
    pub const START: Self = Self(0);

    #[must_use]
    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a paginated query: resource plus normalized filters.
///
/// Filters that differ only in excluded keys produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: ResourcePath,
    filters: Filters,
}

impl QueryKey {
    #[must_use]
    pub fn new(resource: ResourcePath, filters: &Filters) -> Self {
        Self {
            resource,
            filters: filters.normalized(),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &ResourcePath {
        &self.resource
    }

    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filters.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}?{}", self.resource, self.filters)
        }
    }
}

/// A single outgoing page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    resource: ResourcePath,
    cursor: Cursor,
    page_size: PageSize,
    filters: Filters,
}

impl PageRequest {
    /// Build a request, stripping excluded keys from `filters`.
    #[must_use]
    pub fn new(resource: ResourcePath, cursor: Cursor, page_size: PageSize, filters: &Filters) -> Self {
        Self {
            resource,
            cursor,
            page_size,
            filters: filters.normalized(),
        }
    }

    /// Request for `cursor` within the query identified by `key`.
    #[must_use]
    pub fn for_key(key: &QueryKey, cursor: Cursor, page_size: PageSize) -> Self {
        Self {
            resource: key.resource.clone(),
            cursor,
            page_size,
            filters: key.filters.clone(),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &ResourcePath {
        &self.resource
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Query-string pairs: `limit`, `offset`, then filters in key order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 2);
        pairs.push(("limit".to_string(), self.page_size.to_string()));
        pairs.push(("offset".to_string(), self.cursor.to_string()));
        pairs.extend(
            self.filters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        pairs
    }
}

/// Items returned for one [`PageRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub cursor: Cursor,
    pub items: Vec<T>,
    pub fetched_at: Timestamp,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(cursor: Cursor, items: Vec<T>) -> Self {
        Self {
            cursor,
            items,
            fetched_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
