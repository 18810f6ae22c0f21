//! Query cache — session-scoped owner of every query's pages.
//!
//! The cache is an explicit context object: whoever builds it decides how
//! long fetched pages live. Pages are never invalidated on a timer, so a
//! caller that navigates away (drops its handle) and comes back finds the
//! scrolled view exactly as it left it. State for a key is discarded only
//! by [`QueryCache::evict`], a parameter change through
//! [`QueryCache::resubscribe`], or [`QueryCache::teardown`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;

use pagewise_domain::page::QueryKey;

use crate::ports::PageSource;
use crate::services::infinite_query::{InfiniteQuery, QuerySpec, QueryState};

/// Retained pagination state for queries returning records of type `T`.
pub struct QueryCache<S, T> {
    source: Arc<S>,
    entries: Mutex<HashMap<QueryKey, Arc<QueryState<T>>>>,
}

impl<S, T> QueryCache<S, T>
where
    S: PageSource,
    T: DeserializeOwned + Send + 'static,
{
    /// Create an empty cache fetching through `source`.
    pub fn new(source: S) -> Self {
        Self::from_shared(Arc::new(source))
    }

    /// Create an empty cache sharing an existing source.
    pub fn from_shared(source: Arc<S>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Arc<QueryState<T>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the query described by `spec`.
    ///
    /// State is created on the first subscription to a key and shared by
    /// later ones. Closing the returned handle detaches it without touching
    /// that state. A retained entry with a different page size is
    /// replaced, since its offsets no longer line up.
    pub fn subscribe(&self, spec: &QuerySpec) -> InfiniteQuery<Arc<S>, T> {
        let mut entries = self.entries();
        let retained = entries
            .get(spec.key())
            .filter(|state| !state.is_closed() && state.page_size() == spec.page_size())
            .cloned();

        let state = if let Some(state) = retained {
            tracing::debug!(query = %spec.key(), "reusing retained pages");
            state
        } else {
            let state = Arc::new(QueryState::new(spec));
            if let Some(previous) = entries.insert(spec.key().clone(), Arc::clone(&state)) {
                previous.close();
            }
            tracing::debug!(query = %spec.key(), "created query state");
            state
        };

        InfiniteQuery::from_state(Arc::clone(&self.source), state, spec.is_enabled())
    }

    /// Move `query` to new parameters.
    ///
    /// When `spec` normalizes to the same key (only `order`, `limit` or
    /// `offset` changed) and page size, the existing pages are kept.
    /// Otherwise the old state is discarded and a fresh subscription
    /// returned.
    pub fn resubscribe(
        &self,
        query: InfiniteQuery<Arc<S>, T>,
        spec: &QuerySpec,
    ) -> InfiniteQuery<Arc<S>, T> {
        let unchanged = query.key() == spec.key()
            && !query.is_closed()
            && query.page_size() == spec.page_size();
        if unchanged {
            return InfiniteQuery::from_state(
                Arc::clone(&self.source),
                Arc::clone(query.state()),
                spec.is_enabled(),
            );
        }

        {
            let mut entries = self.entries();
            let owned = entries
                .get(query.key())
                .is_some_and(|state| Arc::ptr_eq(state, query.state()));
            if owned {
                entries.remove(query.key());
                query.state().close();
            }
        }
        tracing::debug!(from = %query.key(), to = %spec.key(), "parameters changed, discarding pages");
        query.close();
        self.subscribe(spec)
    }

    /// Discard the state held for `key`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn evict(&self, key: &QueryKey) -> bool {
        let removed = self.entries().remove(key);
        if let Some(state) = &removed {
            state.close();
            tracing::debug!(query = %key, "evicted query state");
        }
        removed.is_some()
    }

    /// Discard every entry. Handles still alive see themselves closed.
    pub fn teardown(&self) {
        let drained: Vec<_> = self.entries().drain().collect();
        for (_, state) in &drained {
            state.close();
        }
        tracing::debug!(entries = drained.len(), "query cache torn down");
    }

    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl<S, T> Drop for QueryCache<S, T> {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for state in entries.values() {
            state.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::infinite_query::{FetchOutcome, SkipReason};
    use pagewise_domain::pagination::Phase;
    use crate::testing::InMemorySource;
    use pagewise_domain::filter::Filters;
    use pagewise_domain::page::{PageSize, ResourcePath};

    fn spec(path: &str, filters: &Filters) -> QuerySpec {
        QuerySpec::new(ResourcePath::new(path).unwrap(), filters)
            .with_page_size(PageSize::new(10).unwrap())
    }

    fn cache(total: u64) -> (Arc<InMemorySource>, QueryCache<InMemorySource, u64>) {
        let source = Arc::new(InMemorySource::with_numbers("messages", total));
        let cache = QueryCache::from_shared(Arc::clone(&source));
        (source, cache)
    }

    #[tokio::test]
    async fn should_retain_pages_when_resubscribing_after_drop() {
        let (source, cache) = cache(25);
        let filters = Filters::new();

        let query = cache.subscribe(&spec("messages", &filters));
        query.fetch_next_page().await.unwrap();
        query.fetch_next_page().await.unwrap();
        drop(query);

        let query = cache.subscribe(&spec("messages", &filters));
        assert_eq!(query.items().len(), 20);
        assert_eq!(source.offsets(), vec![0, 10]);

        query.fetch_next_page().await.unwrap();
        assert_eq!(source.offsets(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn should_share_state_between_live_handles_on_same_key() {
        let (source, cache) = cache(25);
        let a = cache.subscribe(&spec("messages", &Filters::new().with("order", "asc")));
        let b = cache.subscribe(&spec("messages", &Filters::new().with("limit", "3")));

        a.fetch_next_page().await.unwrap();

        assert_eq!(b.items().len(), 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn should_keep_sibling_fetching_after_one_handle_closes() {
        let (source, cache) = cache(25);
        let spec = spec("messages", &Filters::new());
        let a = cache.subscribe(&spec);
        let b = cache.subscribe(&spec);

        a.fetch_next_page().await.unwrap();
        a.close();

        assert!(a.is_closed());
        assert!(!b.is_closed());
        assert!(matches!(
            b.fetch_next_page().await.unwrap(),
            FetchOutcome::Fetched { len: 10, .. }
        ));
        assert_eq!(b.items().len(), 20);
        assert_eq!(source.offsets(), vec![0, 10]);
        assert!(cache.contains(spec.key()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn should_settle_shared_state_when_closed_handle_result_arrives() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25).gated());
        let cache: QueryCache<_, u64> = QueryCache::from_shared(Arc::clone(&source));
        let spec = spec("messages", &Filters::new());
        let a = cache.subscribe(&spec);
        let b = cache.subscribe(&spec);

        let (outcome, ()) = tokio::join!(a.fetch_next_page(), async {
            source.wait_started().await;
            a.close();
            source.release();
        });

        assert_eq!(outcome.unwrap(), FetchOutcome::Discarded);
        assert_eq!(b.items().len(), 10);
        assert_eq!(b.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn should_keep_sibling_pages_when_disabled_handle_restarts() {
        let (source, cache) = cache(25);
        let live_spec = spec("messages", &Filters::new());
        let live = cache.subscribe(&live_spec);
        live.fetch_up_to(2).await.unwrap();

        let disabled = cache.subscribe(&live_spec.clone().with_enabled(false));
        let outcome = disabled.restart().await.unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::Disabled));
        assert_eq!(live.items().len(), 20);
        assert_eq!(source.offsets(), vec![0, 10]);
    }

    #[tokio::test]
    async fn should_forget_evicted_entries() {
        let (_source, cache) = cache(25);
        let spec = spec("messages", &Filters::new());
        let query = cache.subscribe(&spec);
        query.close();

        assert!(cache.contains(spec.key()));
        assert!(cache.evict(spec.key()));
        assert!(!cache.contains(spec.key()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn should_keep_pages_when_only_excluded_keys_change() {
        let (_source, cache) = cache(25);
        let query = cache.subscribe(&spec("messages", &Filters::new()));
        query.fetch_next_page().await.unwrap();

        let query = cache.resubscribe(query, &spec("messages", &Filters::new().with("order", "desc")));

        assert_eq!(query.items().len(), 10);
        assert!(!query.is_closed());
    }

    #[tokio::test]
    async fn should_discard_pages_when_filters_change() {
        let (_source, cache) = cache(25);
        let old_spec = spec("messages", &Filters::new());
        let query = cache.subscribe(&old_spec);
        query.fetch_next_page().await.unwrap();

        let new_spec = spec("messages", &Filters::new().with("search", "x"));
        let query = cache.resubscribe(query, &new_spec);

        assert!(query.items().is_empty());
        assert!(!cache.contains(old_spec.key()));
        assert!(cache.contains(new_spec.key()));
    }

    #[tokio::test]
    async fn should_replace_entry_when_page_size_changes() {
        let (_source, cache) = cache(25);
        let filters = Filters::new();
        let query = cache.subscribe(&spec("messages", &filters));
        query.fetch_next_page().await.unwrap();

        let bigger = spec("messages", &filters).with_page_size(PageSize::new(20).unwrap());
        let replacement = cache.subscribe(&bigger);

        assert!(query.is_closed());
        assert!(replacement.items().is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn should_close_handles_on_evict() {
        let (_source, cache) = cache(25);
        let spec = spec("messages", &Filters::new());
        let query = cache.subscribe(&spec);

        assert!(cache.evict(spec.key()));
        assert!(!cache.evict(spec.key()));
        assert_eq!(
            query.fetch_next_page().await.unwrap(),
            FetchOutcome::Skipped(SkipReason::Closed)
        );
    }

    #[tokio::test]
    async fn should_discard_in_flight_result_on_teardown() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25).gated());
        let cache: QueryCache<_, u64> = QueryCache::from_shared(Arc::clone(&source));
        let query = cache.subscribe(&spec("messages", &Filters::new()));

        let (outcome, ()) = tokio::join!(query.fetch_next_page(), async {
            source.wait_started().await;
            cache.teardown();
            source.release();
        });

        assert_eq!(outcome.unwrap(), FetchOutcome::Discarded);
        assert!(cache.is_empty());
        assert!(query.items().is_empty());
    }

    #[tokio::test]
    async fn should_close_outstanding_handles_when_cache_dropped() {
        let (_source, cache) = cache(25);
        let query = cache.subscribe(&spec("messages", &Filters::new()));

        drop(cache);

        assert!(query.is_closed());
    }
}
