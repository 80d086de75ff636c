//! Bookmark synchronization view: the locally cached list for one owner.
//!
//! DESIGN
//! ======
//! The view owns a `Vec<Bookmark>` plus one change subscription. Any change
//! event triggers a full re-fetch; the list is never patched incrementally.
//!
//! Fetches are split into `begin_fetch` / `apply_fetch` so the caller can run
//! them concurrently with other work. Each fetch carries a `FetchTicket`:
//! - `mount`: bumped on every mount/unmount. Results from an earlier mount are
//!   dropped, so a response that lands after sign-out never touches state.
//! - `seq`: bumped on every fetch. A result older than one already applied is
//!   dropped, so out-of-order completions cannot roll the list back.
//!
//! LIFECYCLE
//! =========
//! `Uninitialized → Loading → Ready → Loading (each change) → Ready ...`
//! `unmount()` returns to `Uninitialized`. There is no error phase: a failed
//! fetch keeps the previous list, returns to `Ready`, records `last_error`,
//! and hands the error back to the caller.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{Bookmark, BookmarkStore, ChangeEvent, EventMask, StoreError, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Identifies one issued fetch; see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub owner_id: Uuid,
    mount: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced the local list.
    Applied,
    /// The result belonged to an earlier mount or was superseded; ignored.
    Stale,
}

/// A list request in flight, resolved together with its ticket.
pub type PendingFetch = BoxFuture<'static, (FetchTicket, Result<Vec<Bookmark>, StoreError>)>;

pub struct SyncView {
    store: Arc<dyn BookmarkStore>,
    owner_id: Option<Uuid>,
    phase: SyncPhase,
    bookmarks: Vec<Bookmark>,
    subscription: Option<Subscription>,
    mount: u64,
    issued_seq: u64,
    applied_seq: u64,
    last_error: Option<String>,
}

impl SyncView {
    #[must_use]
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self {
            store,
            owner_id: None,
            phase: SyncPhase::Uninitialized,
            bookmarks: Vec::new(),
            subscription: None,
            mount: 0,
            issued_seq: 0,
            applied_seq: 0,
            last_error: None,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Attach the view to `owner_id`: subscribe, then perform the initial load.
    ///
    /// Mounting a different owner tears down the previous subscription first.
    /// Mounting the same owner again only re-fetches.
    ///
    /// # Errors
    ///
    /// Returns the store error if the initial load fails. The subscription
    /// stays open, so the next change event retries the load.
    pub async fn mount(&mut self, owner_id: Uuid) -> Result<FetchOutcome, StoreError> {
        if self.owner_id != Some(owner_id) || self.subscription.is_none() {
            self.unmount();
            self.owner_id = Some(owner_id);
            self.subscription = Some(self.store.subscribe(owner_id, EventMask::ALL));
            info!(%owner_id, "sync view mounted");
        }
        self.refresh().await
    }

    /// Detach the view: unsubscribe, drop the cached list, invalidate in-flight fetches.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.store.unsubscribe(subscription.handle());
        }
        if let Some(owner_id) = self.owner_id.take() {
            info!(%owner_id, "sync view unmounted");
        }
        self.mount += 1;
        self.bookmarks.clear();
        self.phase = SyncPhase::Uninitialized;
        self.last_error = None;
    }

    // =========================================================================
    // FETCH
    // =========================================================================

    /// Issue a ticket for a new fetch and enter `Loading`. `None` if unmounted.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let owner_id = self.owner_id?;
        self.issued_seq += 1;
        self.phase = SyncPhase::Loading;
        Some(FetchTicket { owner_id, mount: self.mount, seq: self.issued_seq })
    }

    /// Begin a fetch and return the request future, detached from `self`.
    pub fn fetch(&mut self) -> Option<PendingFetch> {
        let ticket = self.begin_fetch()?;
        let store = Arc::clone(&self.store);
        Some(Box::pin(async move {
            let result = store.list(ticket.owner_id).await;
            (ticket, result)
        }))
    }

    /// Apply the result of a fetch issued by `begin_fetch`.
    ///
    /// # Errors
    ///
    /// Returns the store error of a current (non-stale) fetch. The cached
    /// list is left untouched in that case.
    pub fn apply_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Bookmark>, StoreError>,
    ) -> Result<FetchOutcome, StoreError> {
        if ticket.mount != self.mount || ticket.seq <= self.applied_seq {
            debug!(owner_id = %ticket.owner_id, seq = ticket.seq, "discarding stale fetch result");
            return Ok(FetchOutcome::Stale);
        }
        if ticket.seq == self.issued_seq {
            self.phase = SyncPhase::Ready;
        }

        match result {
            Ok(bookmarks) => {
                debug!(owner_id = %ticket.owner_id, count = bookmarks.len(), "bookmark list refreshed");
                self.bookmarks = bookmarks;
                self.applied_seq = ticket.seq;
                self.last_error = None;
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                warn!(owner_id = %ticket.owner_id, error = %e, "bookmark list fetch failed; keeping cached list");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch and apply in one step.
    ///
    /// # Errors
    ///
    /// See [`SyncView::apply_fetch`].
    pub async fn refresh(&mut self) -> Result<FetchOutcome, StoreError> {
        let Some(pending) = self.fetch() else {
            return Ok(FetchOutcome::Stale);
        };
        let (ticket, result) = pending.await;
        self.apply_fetch(ticket, result)
    }

    // =========================================================================
    // CHANGES
    // =========================================================================

    /// Wait for the next change event. `None` when not subscribed.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// React to a change event by starting a full re-fetch.
    pub fn handle_change(&mut self, event: ChangeEvent) -> Option<PendingFetch> {
        if self.owner_id != Some(event.owner_id) {
            debug!(owner_id = %event.owner_id, "ignoring change for another owner");
            return None;
        }
        debug!(owner_id = %event.owner_id, kind = ?event.kind, id = %event.id, "change received; re-fetching");
        self.fetch()
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    #[cfg(test)]
    #[must_use]
    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    #[must_use]
    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn find(&self, id: Uuid) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    /// Derived view of the cached list; see [`filter_bookmarks`].
    #[must_use]
    pub fn filter(&self, query: &str) -> Vec<&Bookmark> {
        filter_bookmarks(&self.bookmarks, query)
    }
}

/// Bookmarks whose title or URL contains `query`, case-insensitively, in
/// their original order. A blank query selects everything.
#[must_use]
pub fn filter_bookmarks<'a>(bookmarks: &'a [Bookmark], query: &str) -> Vec<&'a Bookmark> {
    if query.trim().is_empty() {
        return bookmarks.iter().collect();
    }

    let needle = query.to_lowercase();
    bookmarks
        .iter()
        .filter(|b| b.title.to_lowercase().contains(&needle) || b.url.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
