//! Infinite query — a subscription over one paginated resource.
//!
//! A handle drives the [`PaginationState`] of its [`QueryKey`]: each
//! trigger requests at most one page, a trigger while another request is
//! still pending is a no-op, and a request that settles after the
//! state was torn down is dropped without touching it.
//!
//! Closing a handle detaches only that handle. Handles from a
//! [`QueryCache`](crate::services::query_cache::QueryCache) share their
//! key's state, which only the cache tears down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use pagewise_domain::error::FetchError;
use pagewise_domain::filter::Filters;
use pagewise_domain::page::{Cursor, Page, PageRequest, PageSize, QueryKey, ResourcePath};
use pagewise_domain::pagination::{PaginationState, Phase, Refusal};

use crate::ports::PageSource;

/// Everything needed to subscribe to a paginated resource.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    key: QueryKey,
    page_size: PageSize,
    enabled: bool,
    error_message: Option<String>,
}

impl QuerySpec {
    /// Spec for `resource` with the default page size.
    ///
    /// `order`, `limit` and `offset` are dropped from `filters`.
    #[must_use]
    pub fn new(resource: ResourcePath, filters: &Filters) -> Self {
        Self {
            key: QueryKey::new(resource, filters),
            page_size: PageSize::default(),
            enabled: true,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    /// A disabled query never issues requests.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// User-facing message reported in snapshots when a page fails.
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Point-in-time view of a query, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySnapshot {
    pub phase: Phase,
    pub page_count: usize,
    pub item_count: usize,
    pub has_next_page: bool,
    /// Set while the query is errored.
    pub error: Option<String>,
}

impl QuerySnapshot {
    fn of<T>(state: &PaginationState<T>, error_message: Option<&str>) -> Self {
        let error = match state.phase() {
            Phase::Errored { error, .. } => Some(
                error_message
                    .map_or_else(|| error.to_string(), ToString::to_string),
            ),
            _ => None,
        };
        Self {
            phase: state.phase().clone(),
            page_count: state.pages().len(),
            item_count: state.item_count(),
            has_next_page: state.has_next_page(),
            error,
        }
    }
}

/// Why a trigger did not issue a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The query is disabled.
    Disabled,
    /// The subscription was torn down.
    Closed,
    /// A request for this query is still pending.
    InFlight,
    /// The last page was short.
    Exhausted,
    /// [`InfiniteQuery::retry`] was called while nothing had failed.
    NothingToRetry,
}

impl From<Refusal> for SkipReason {
    fn from(refusal: Refusal) -> Self {
        match refusal {
            Refusal::InFlight => Self::InFlight,
            Refusal::Exhausted => Self::Exhausted,
        }
    }
}

/// Result of a trigger that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page arrived and was stored.
    Fetched {
        cursor: Cursor,
        len: usize,
        has_next_page: bool,
    },
    /// No request was issued.
    Skipped(SkipReason),
    /// The request settled after teardown and its result was dropped.
    Discarded,
}

/// Pagination state for one key, shared by every handle on that key.
pub(crate) struct QueryState<T> {
    key: QueryKey,
    pagination: Mutex<PaginationState<T>>,
    error_message: Option<String>,
    closed: AtomicBool,
    snapshots: watch::Sender<QuerySnapshot>,
}

impl<T> QueryState<T> {
    pub(crate) fn new(spec: &QuerySpec) -> Self {
        let pagination = PaginationState::new(spec.page_size);
        let (snapshots, _) = watch::channel(QuerySnapshot::of(&pagination, None));
        Self {
            key: spec.key.clone(),
            pagination: Mutex::new(pagination),
            error_message: spec.error_message.clone(),
            closed: AtomicBool::new(false),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaginationState<T>> {
        self.pagination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PaginationState<T>) {
        self.snapshots
            .send_replace(QuerySnapshot::of(state, self.error_message.as_deref()));
    }

    pub(crate) fn page_size(&self) -> PageSize {
        self.lock().page_size()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Returns the state to its pre-request phase unless the request settled.
///
/// Covers callers dropping a pending fetch future as well as results
/// discarded after teardown.
struct InFlight<'a, T> {
    state: &'a QueryState<T>,
    settled: bool,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            let mut pagination = self.state.lock();
            pagination.abandon();
            self.state.publish(&pagination);
        }
    }
}

/// Subscription handle over a paginated resource.
pub struct InfiniteQuery<S, T> {
    source: S,
    state: Arc<QueryState<T>>,
    enabled: bool,
    closed: AtomicBool,
    owns_state: bool,
}

impl<S, T> InfiniteQuery<S, T>
where
    S: PageSource,
    T: DeserializeOwned + Send + 'static,
{
    /// Standalone subscription owning its own state.
    pub fn new(source: S, spec: &QuerySpec) -> Self {
        Self {
            owns_state: true,
            ..Self::from_state(source, Arc::new(QueryState::new(spec)), spec.enabled)
        }
    }

    /// Handle onto state owned by someone else (the cache).
    pub(crate) fn from_state(source: S, state: Arc<QueryState<T>>, enabled: bool) -> Self {
        Self {
            source,
            state,
            enabled,
            closed: AtomicBool::new(false),
            owns_state: false,
        }
    }

    pub(crate) fn state(&self) -> &Arc<QueryState<T>> {
        &self.state
    }

    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.state.key
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.state.is_closed()
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.state.page_size()
    }

    /// Request the next page.
    ///
    /// From `Idle` this is the first page at offset 0; from `Ready` the
    /// page at [`next_cursor`](pagewise_domain::pagination::next_cursor);
    /// from `Errored` the page that failed.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of a failed request. The query is then
    /// `Errored` and every earlier page is kept.
    pub async fn fetch_next_page(&self) -> Result<FetchOutcome, FetchError> {
        if !self.enabled {
            return Ok(FetchOutcome::Skipped(SkipReason::Disabled));
        }
        if self.is_closed() {
            return Ok(FetchOutcome::Skipped(SkipReason::Closed));
        }

        let (cursor, page_size) = {
            let mut pagination = self.state.lock();
            match pagination.begin_fetch() {
                Ok(cursor) => {
                    self.state.publish(&pagination);
                    (cursor, pagination.page_size())
                }
                Err(refusal) => {
                    tracing::trace!(query = %self.state.key, ?refusal, "trigger ignored");
                    return Ok(FetchOutcome::Skipped(refusal.into()));
                }
            }
        };

        let mut guard = InFlight {
            state: &self.state,
            settled: false,
        };
        let request = PageRequest::for_key(&self.state.key, cursor, page_size);
        tracing::debug!(query = %self.state.key, %cursor, limit = %page_size, "fetching page");

        let result = self.source.fetch_page::<T>(&request).await;

        if self.state.is_closed() {
            guard.settled = true;
            tracing::debug!(query = %self.state.key, %cursor, "discarding page after teardown");
            return Ok(FetchOutcome::Discarded);
        }

        // A detached handle still settles the shared state so siblings are
        // not left waiting on its request.
        let detached = self.closed.load(Ordering::Acquire);
        let mut pagination = self.state.lock();
        guard.settled = true;
        match result {
            Ok(items) => {
                let len = items.len();
                pagination.complete(items);
                let has_next_page = pagination.has_next_page();
                self.state.publish(&pagination);
                if detached {
                    return Ok(FetchOutcome::Discarded);
                }
                if has_next_page {
                    tracing::debug!(query = %self.state.key, %cursor, len, "page stored");
                } else {
                    tracing::info!(
                        query = %self.state.key,
                        pages = pagination.pages().len(),
                        items = pagination.item_count(),
                        "pagination exhausted"
                    );
                }
                Ok(FetchOutcome::Fetched {
                    cursor,
                    len,
                    has_next_page,
                })
            }
            Err(err) => {
                tracing::warn!(query = %self.state.key, %cursor, error = %err, "page request failed");
                pagination.fail(err.clone());
                self.state.publish(&pagination);
                if detached {
                    return Ok(FetchOutcome::Discarded);
                }
                Err(err)
            }
        }
    }

    /// Re-trigger the request that failed.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] if the retry fails again.
    pub async fn retry(&self) -> Result<FetchOutcome, FetchError> {
        if !matches!(self.phase(), Phase::Errored { .. }) {
            return Ok(FetchOutcome::Skipped(SkipReason::NothingToRetry));
        }
        self.fetch_next_page().await
    }

    /// Drop every page and fetch the first one again.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] if the first page fails.
    pub async fn restart(&self) -> Result<FetchOutcome, FetchError> {
        if !self.enabled {
            return Ok(FetchOutcome::Skipped(SkipReason::Disabled));
        }
        if self.is_closed() {
            return Ok(FetchOutcome::Skipped(SkipReason::Closed));
        }
        {
            let mut pagination = self.state.lock();
            if pagination.phase().is_in_flight() {
                return Ok(FetchOutcome::Skipped(SkipReason::InFlight));
            }
            pagination.reset();
            self.state.publish(&pagination);
        }
        tracing::debug!(query = %self.state.key, "restarting from first page");
        self.fetch_next_page().await
    }

    /// Fetch pages until the resource is exhausted.
    ///
    /// Returns the number of pages fetched by this call.
    ///
    /// # Errors
    ///
    /// Stops at the first failing page and returns its error.
    pub async fn fetch_all(&self) -> Result<usize, FetchError> {
        self.fetch_up_to(usize::MAX).await
    }

    /// Fetch at most `max_pages` pages, stopping early once exhausted.
    ///
    /// # Errors
    ///
    /// Stops at the first failing page and returns its error.
    pub async fn fetch_up_to(&self, max_pages: usize) -> Result<usize, FetchError> {
        let mut fetched = 0;
        while fetched < max_pages {
            match self.fetch_next_page().await? {
                FetchOutcome::Fetched { has_next_page, .. } => {
                    fetched += 1;
                    if !has_next_page {
                        break;
                    }
                }
                FetchOutcome::Skipped(_) | FetchOutcome::Discarded => break,
            }
        }
        Ok(fetched)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase().clone()
    }

    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.state.lock().has_next_page()
    }

    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot {
        self.state.snapshots.borrow().clone()
    }

    /// Observe snapshots as the query transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<QuerySnapshot> {
        self.state.snapshots.subscribe()
    }

    /// Run `f` over the pages held so far.
    pub fn with_pages<R>(&self, f: impl FnOnce(&[Page<T>]) -> R) -> R {
        f(self.state.lock().pages())
    }

    /// Tear the subscription down.
    ///
    /// A request still pending resolves to [`FetchOutcome::Discarded`].
    /// Standalone queries drop its result; cache handles leave the shared
    /// state to their siblings.
    pub fn close(&self) {
        tracing::debug!(query = %self.state.key, "subscription closed");
        self.closed.store(true, Ordering::Release);
        if self.owns_state {
            self.state.close();
        }
    }
}

impl<S, T> InfiniteQuery<S, T>
where
    S: PageSource,
    T: Clone + DeserializeOwned + Send + 'static,
{
    /// Every item fetched so far, in fetch order.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items().cloned().collect()
    }

    /// Copy of the pages fetched so far.
    #[must_use]
    pub fn pages(&self) -> Vec<Page<T>> {
        self.state.lock().pages().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::InMemorySource;

    fn spec(path: &str, page_size: u32) -> QuerySpec {
        QuerySpec::new(ResourcePath::new(path).unwrap(), &Filters::new())
            .with_page_size(PageSize::new(page_size).unwrap())
    }

    fn lengths(query: &InfiniteQuery<Arc<InMemorySource>, u64>) -> Vec<usize> {
        query.with_pages(|pages| pages.iter().map(Page::len).collect())
    }

    #[tokio::test]
    async fn should_fetch_pages_at_expected_offsets_for_twenty_five_items() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let fetched = query.fetch_all().await.unwrap();

        assert_eq!(fetched, 3);
        assert_eq!(source.offsets(), vec![0, 10, 20]);
        assert_eq!(lengths(&query), vec![10, 10, 5]);
        assert_eq!(query.phase(), Phase::Exhausted);
        assert_eq!(query.items(), (0..25).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn should_request_trailing_empty_page_for_exact_multiple() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 20));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        query.fetch_all().await.unwrap();

        assert_eq!(source.offsets(), vec![0, 10, 20]);
        assert_eq!(lengths(&query), vec![10, 10, 0]);
        assert!(!query.has_next_page());
    }

    #[tokio::test]
    async fn should_skip_trigger_after_exhaustion() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 3));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        query.fetch_all().await.unwrap();
        let outcome = query.fetch_next_page().await.unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::Exhausted));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn should_never_forward_caller_pagination_keys() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 5));
        let filters = Filters::new()
            .with("limit", "1000")
            .with("offset", "77")
            .with("order", "desc")
            .with("search", "hello");
        let spec = QuerySpec::new(ResourcePath::new("messages").unwrap(), &filters);
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec);

        query.fetch_next_page().await.unwrap();

        let request = &source.requests()[0];
        assert_eq!(request.cursor(), Cursor::START);
        assert_eq!(request.page_size(), PageSize::default());
        assert_eq!(request.filters().get("search"), Some("hello"));
        assert!(request.filters().get("order").is_none());
        assert!(request.filters().get("limit").is_none());
        assert!(request.filters().get("offset").is_none());
    }

    #[tokio::test]
    async fn should_keep_earlier_pages_and_retry_only_failed_page() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 15));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        query.fetch_next_page().await.unwrap();
        source.fail_next(FetchError::Network {
            message: "connection reset".to_string(),
        });
        let err = query.fetch_next_page().await.unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }));
        assert!(matches!(query.phase(), Phase::Errored { cursor, .. } if cursor == Cursor::new(10)));
        assert_eq!(lengths(&query), vec![10]);

        let outcome = query.retry().await.unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Fetched {
                cursor: Cursor::new(10),
                len: 5,
                has_next_page: false
            }
        );
        assert_eq!(source.offsets(), vec![0, 10, 10]);
        assert_eq!(query.items(), (0..15).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn should_skip_retry_when_nothing_failed() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 15));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let outcome = query.retry().await.unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::NothingToRetry));
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn should_report_configured_error_message_in_snapshot() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 15));
        let spec = spec("messages", 10).with_error_message("Failed to fetch messages.");
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec);

        source.fail_next(FetchError::Request {
            status: 500,
            message: "boom".to_string(),
        });
        let _ = query.fetch_next_page().await;

        let snapshot = query.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Failed to fetch messages."));
        assert_eq!(snapshot.page_count, 0);
        assert!(snapshot.has_next_page);
    }

    #[tokio::test]
    async fn should_not_request_when_disabled() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 15));
        let spec = spec("messages", 10).with_enabled(false);
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec);

        let outcome = query.fetch_next_page().await.unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::Disabled));
        assert!(source.requests().is_empty());
        assert_eq!(query.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn should_not_reset_pages_when_disabled_query_restarts() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 15));
        let spec = spec("messages", 10).with_enabled(false);
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec);

        let outcome = query.restart().await.unwrap();

        assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::Disabled));
        assert!(source.requests().is_empty());
        assert_eq!(query.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn should_ignore_second_trigger_while_first_is_pending() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25).gated());
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let (first, second) = tokio::join!(query.fetch_next_page(), async {
            source.wait_started().await;
            let outcome = query.fetch_next_page().await;
            source.release();
            outcome
        });

        assert!(matches!(first.unwrap(), FetchOutcome::Fetched { len: 10, .. }));
        assert_eq!(second.unwrap(), FetchOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn should_discard_result_arriving_after_close() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25).gated());
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let mut rx = query.watch();

        let (outcome, ()) = tokio::join!(query.fetch_next_page(), async {
            source.wait_started().await;
            query.close();
            rx.borrow_and_update();
            source.release();
        });

        assert_eq!(outcome.unwrap(), FetchOutcome::Discarded);
        assert!(lengths(&query).is_empty());
        assert_eq!(query.phase(), Phase::Loading { cursor: Cursor::START });
        assert!(!rx.has_changed().unwrap());
        assert_eq!(
            query.fetch_next_page().await.unwrap(),
            FetchOutcome::Skipped(SkipReason::Closed)
        );
    }

    #[tokio::test]
    async fn should_release_in_flight_slot_when_fetch_future_is_dropped() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 25).gated());
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        tokio::select! {
            _ = query.fetch_next_page() => panic!("gated fetch should not finish"),
            () = source.wait_started() => {}
        }

        assert_eq!(query.phase(), Phase::Idle);
        source.release();
        let outcome = query.fetch_next_page().await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Fetched { cursor, .. } if cursor == Cursor::START));
    }

    #[tokio::test]
    async fn should_yield_identical_items_after_restart() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 23));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        query.fetch_all().await.unwrap();
        let first = query.pages().into_iter().map(|p| p.items).collect::<Vec<_>>();

        query.restart().await.unwrap();
        query.fetch_all().await.unwrap();
        let second = query.pages().into_iter().map(|p| p.items).collect::<Vec<_>>();

        assert_eq!(first, second);
        assert_eq!(source.offsets(), vec![0, 10, 20, 0, 10, 20]);
    }

    #[tokio::test]
    async fn should_publish_snapshots_to_watchers() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 12));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));
        let mut rx = query.watch();

        query.fetch_next_page().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.phase, Phase::Ready);
        assert_eq!(snapshot.item_count, 10);
        assert!(snapshot.has_next_page);
    }

    #[tokio::test]
    async fn should_stop_at_page_limit() {
        let source = Arc::new(InMemorySource::with_numbers("messages", 100));
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let fetched = query.fetch_up_to(2).await.unwrap();

        assert_eq!(fetched, 2);
        assert_eq!(source.offsets(), vec![0, 10]);
        assert_eq!(query.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn should_surface_decode_errors() {
        let source = Arc::new(InMemorySource::default());
        source.insert_collection("messages", vec![serde_json::json!("not a number")]);
        let query = InfiniteQuery::<_, u64>::new(Arc::clone(&source), &spec("messages", 10));

        let err = query.fetch_next_page().await.unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
