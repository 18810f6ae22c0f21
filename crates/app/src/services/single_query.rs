//! Single query — cached fetch of one record.

use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;

use pagewise_domain::error::FetchError;
use pagewise_domain::page::ResourcePath;

use crate::ports::PageSource;

/// Fetches one record once and serves it from memory afterwards.
///
/// A query built without a path is disabled and never requests anything.
pub struct SingleQuery<S, T> {
    source: S,
    path: Option<ResourcePath>,
    cached: Mutex<Option<T>>,
}

impl<S, T> SingleQuery<S, T>
where
    S: PageSource,
    T: Clone + DeserializeOwned + Send + 'static,
{
    pub fn new(source: S, path: Option<ResourcePath>) -> Self {
        Self {
            source,
            path,
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// The cached record, if one was fetched.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the cached record, fetching it on first use.
    ///
    /// Returns `Ok(None)` when the query is disabled.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of a failed request; nothing is cached.
    pub async fn fetch(&self) -> Result<Option<T>, FetchError> {
        if let Some(record) = self.data() {
            return Ok(Some(record));
        }
        self.refetch().await
    }

    /// Fetch the record again, replacing the cached copy.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of a failed request; the previous copy
    /// is kept.
    pub async fn refetch(&self) -> Result<Option<T>, FetchError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        tracing::debug!(resource = %path, "fetching record");
        let record: T = self.source.fetch_one(path).await.inspect_err(|err| {
            tracing::warn!(resource = %path, error = %err, "record request failed");
        })?;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(Some(record))
    }

    /// Forget the cached record so the next [`fetch`](Self::fetch) hits the source.
    pub fn invalidate(&self) {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
