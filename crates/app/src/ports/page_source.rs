//! Page source port — read access to a paginated REST backend.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use pagewise_domain::error::FetchError;
use pagewise_domain::page::{PageRequest, ResourcePath};

/// Retrieves items from a remote resource.
///
/// Item records are opaque to the application: callers pick the record
/// type and the source only has to decode a sequence of them.
pub trait PageSource: Send + Sync {
    /// Fetch the items for one page.
    ///
    /// The request already carries normalized filters; implementations
    /// must send `limit` and `offset` from the request itself.
    fn fetch_page<T>(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Vec<T>, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static;

    /// Fetch a single record.
    fn fetch_one<T>(
        &self,
        path: &ResourcePath,
    ) -> impl Future<Output = Result<T, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static;
}

impl<S: PageSource> PageSource for Arc<S> {
    fn fetch_page<T>(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Vec<T>, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        (**self).fetch_page(request)
    }

    fn fetch_one<T>(
        &self,
        path: &ResourcePath,
    ) -> impl Future<Output = Result<T, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        (**self).fetch_one(path)
    }
}
