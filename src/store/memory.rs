//! In-memory `BookmarkStore` used as the fake dependency in tests.
//!
//! Writes publish straight into the store's own `ChangeHub`, standing in
//! for the database trigger + listener pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{Bookmark, BookmarkStore, ChangeEvent, ChangeHub, ChangeKind, EventMask, NewBookmark, StoreError};
use super::{Subscription, SubscriptionHandle};

#[derive(Default)]
pub struct MemoryBookmarkStore {
    rows: Mutex<Vec<Bookmark>>,
    hub: ChangeHub,
    failing_lists: AtomicUsize,
    failing_writes: AtomicUsize,
    list_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryBookmarkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `list` fail.
    pub fn fail_next_lists(&self, count: usize) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` inserts/deletes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Inserts and deletes attempted, including rejected ones.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Insert a row directly with a fixed timestamp offset, without publishing.
    pub fn seed(&self, owner_id: Uuid, title: &str, url: &str, age_secs: i64) -> Bookmark {
        let bookmark = Bookmark {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_owned(),
            url: url.to_owned(),
            created_at: OffsetDateTime::now_utc() - Duration::seconds(age_secs),
        };
        self.rows.lock().expect("rows lock").push(bookmark.clone());
        bookmark
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn list(&self, owner_id: Uuid) -> Result<Vec<Bookmark>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_lists) {
            return Err(StoreError::Unavailable("injected list failure".into()));
        }

        let mut rows: Vec<Bookmark> = self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|b| b.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn insert(&self, bookmark: NewBookmark) -> Result<Bookmark, StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }

        let row = Bookmark {
            id: Uuid::new_v4(),
            owner_id: bookmark.owner_id,
            title: bookmark.title,
            url: bookmark.url,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.lock().expect("rows lock").push(row.clone());
        self.hub
            .publish(ChangeEvent { kind: ChangeKind::Insert, id: row.id, owner_id: row.owner_id });
        Ok(row)
    }

    async fn delete_by_id(&self, owner_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }

        {
            let mut rows = self.rows.lock().expect("rows lock");
            let Some(pos) = rows
                .iter()
                .position(|b| b.id == id && b.owner_id == owner_id)
            else {
                return Err(StoreError::NotFound(id));
            };
            rows.remove(pos);
        }
        self.hub
            .publish(ChangeEvent { kind: ChangeKind::Delete, id, owner_id });
        Ok(())
    }

    fn subscribe(&self, owner_id: Uuid, mask: EventMask) -> Subscription {
        self.hub.subscribe(owner_id, mask)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.hub.unsubscribe(handle);
    }
}
