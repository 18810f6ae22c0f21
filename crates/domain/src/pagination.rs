//! Pagination rules and the per-query pagination state machine.
//!
//! ```text
//! Idle ─▶ Loading ─▶ Ready ⇄ LoadingMore
//!            │         │          │
//!            ▼         ▼          ▼
//!         Errored   Exhausted  Errored / Exhausted
//! ```
//!
//! `Errored` is terminal for the failing request only: the next trigger
//! re-enters `Loading` for that same cursor and keeps every page fetched
//! so far.

use crate::error::FetchError;
use crate::page::{Cursor, Page, PageSize};

/// `false` once the last page came back shorter than a full page.
///
/// A page of exactly `page_size` items still reports more, so a resource
/// holding an exact multiple of the page size ends with one empty page.
#[must_use]
pub fn has_next_page(last_page_len: usize, page_size: PageSize) -> bool {
    last_page_len >= page_size.as_usize()
}

/// Offset of the page following `page_count` fetched pages.
///
/// Computed as `max(page_count, 1) * page_size`, which yields
/// `page_size` after the first page.
#[must_use]
pub fn next_cursor(page_count: usize, page_size: PageSize) -> Cursor {
    let pages = u64::try_from(page_count.max(1)).unwrap_or(u64::MAX);
    Cursor::new(pages.saturating_mul(u64::from(page_size.get())))
}

/// Where a query currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Nothing requested yet.
    Idle,
    /// Fetching the first page, or re-fetching a page that failed.
    Loading { cursor: Cursor },
    /// At least one page is available and more may follow.
    Ready,
    /// Fetching a page after the ones already held.
    LoadingMore { cursor: Cursor },
    /// The last page was short; nothing more will be requested.
    Exhausted,
    /// The request for `cursor` failed.
    Errored { cursor: Cursor, error: FetchError },
}

impl Phase {
    /// A request is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Loading { .. } | Self::LoadingMore { .. })
    }

    /// Short lowercase name, used in logs and snapshots.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading { .. } => "loading",
            Self::Ready => "ready",
            Self::LoadingMore { .. } => "loading_more",
            Self::Exhausted => "exhausted",
            Self::Errored { .. } => "errored",
        }
    }
}

/// Why [`PaginationState::begin_fetch`] declined to start a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Another request for this query has not settled yet.
    InFlight,
    /// The last page was short.
    Exhausted,
}

/// Pages fetched so far for one query, in fetch order.
#[derive(Debug, Clone)]
pub struct PaginationState<T> {
    pages: Vec<Page<T>>,
    page_size: PageSize,
    phase: Phase,
}

impl<T> PaginationState<T> {
    #[must_use]
    pub fn new(page_size: PageSize) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    /// Total number of items across every page.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Concatenation of every page's items, in fetch order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    /// Whether another page may be requested.
    ///
    /// `true` before the first page arrives and after a failure, since
    /// neither has proven the resource exhausted.
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        match self.phase {
            Phase::Exhausted => false,
            _ => self
                .pages
                .last()
                .is_none_or(|last| has_next_page(last.len(), self.page_size)),
        }
    }

    /// Claim the next request, moving into a loading phase.
    ///
    /// # Errors
    ///
    /// Returns a [`Refusal`] when a request is already in flight or the
    /// resource is exhausted. The state is left untouched in that case.
    pub fn begin_fetch(&mut self) -> Result<Cursor, Refusal> {
        let (cursor, phase) = match &self.phase {
            Phase::Loading { .. } | Phase::LoadingMore { .. } => return Err(Refusal::InFlight),
            Phase::Exhausted => return Err(Refusal::Exhausted),
            Phase::Idle => (Cursor::START, Phase::Loading { cursor: Cursor::START }),
            Phase::Ready => {
                let cursor = next_cursor(self.pages.len(), self.page_size);
                (cursor, Phase::LoadingMore { cursor })
            }
            Phase::Errored { cursor, .. } => (*cursor, Phase::Loading { cursor: *cursor }),
        };
        self.phase = phase;
        Ok(cursor)
    }

    /// Record the items for the in-flight request.
    ///
    /// Returns the cursor they were stored under, or `None` (state
    /// unchanged) when no request was in flight.
    pub fn complete(&mut self, items: Vec<T>) -> Option<Cursor> {
        let cursor = self.in_flight_cursor()?;
        let more = has_next_page(items.len(), self.page_size);
        self.pages.push(Page::new(cursor, items));
        self.phase = if more { Phase::Ready } else { Phase::Exhausted };
        Some(cursor)
    }

    /// Record the failure of the in-flight request. Earlier pages stay.
    ///
    /// Returns the failing cursor, or `None` (state unchanged) when no
    /// request was in flight.
    pub fn fail(&mut self, error: FetchError) -> Option<Cursor> {
        let cursor = self.in_flight_cursor()?;
        self.phase = Phase::Errored { cursor, error };
        Some(cursor)
    }

    /// Give up on the in-flight request without recording an outcome.
    ///
    /// Returns to `Idle` when no page is held, otherwise to `Ready`; the
    /// next trigger then requests the same cursor again.
    pub fn abandon(&mut self) {
        if self.phase.is_in_flight() {
            self.phase = if self.pages.is_empty() {
                Phase::Idle
            } else {
                Phase::Ready
            };
        }
    }

    /// Drop every page and go back to [`Phase::Idle`].
    pub fn reset(&mut self) {
        self.pages.clear();
        self.phase = Phase::Idle;
    }

    fn in_flight_cursor(&self) -> Option<Cursor> {
        match self.phase {
            Phase::Loading { cursor } | Phase::LoadingMore { cursor } => Some(cursor),
            _ => None,
        }
    }
}
