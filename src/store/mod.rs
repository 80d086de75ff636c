//! Bookmark store: data model, store trait, and change subscriptions.
//!
//! DESIGN
//! ======
//! Views never hold a global client handle. Each one receives an
//! `Arc<dyn BookmarkStore>` so tests can swap in the in-memory fake.
//!
//! Change notification is coarse on purpose: a `ChangeEvent` only says that
//! a row for an owner changed. Consumers re-fetch the full list rather than
//! patching their local copy.

pub mod hub;
#[cfg(test)]
pub mod memory;
pub mod postgres;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

pub use hub::{ChangeHub, Subscription, SubscriptionHandle};

// =============================================================================
// TYPES
// =============================================================================

/// A stored bookmark. Mirrors the `bookmarks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub url: String,
    pub created_at: OffsetDateTime,
}

impl Bookmark {
    /// Creation timestamp as RFC 3339, or an empty string if formatting fails.
    #[must_use]
    pub fn created_at_rfc3339(&self) -> String {
        self.created_at.format(&Rfc3339).unwrap_or_default()
    }
}

/// A validated bookmark awaiting insertion. Id and timestamp are store-assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    pub owner_id: Uuid,
    pub title: String,
    pub url: String,
}

/// Kind of row change carried by a `ChangeEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Events may have been missed; the whole list must be re-read.
    #[serde(skip_deserializing)]
    Resync,
}

/// Store-pushed notification that a bookmark row for `owner_id` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "op")]
    pub kind: ChangeKind,
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
}

/// Which change kinds a subscription wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: Self = Self { insert: true, update: true, delete: true };

    #[must_use]
    pub fn contains(self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
            ChangeKind::Resync => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bookmark not found: {0}")]
    NotFound(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_BOOKMARK_NOT_FOUND",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Persistence and change-subscription seam for bookmarks.
#[async_trait::async_trait]
pub trait BookmarkStore: Send + Sync {
    /// All bookmarks owned by `owner_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing query fails.
    async fn list(&self, owner_id: Uuid) -> Result<Vec<Bookmark>, StoreError>;

    /// Insert a bookmark and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store rejects the row.
    async fn insert(&self, bookmark: NewBookmark) -> Result<Bookmark, StoreError>;

    /// Delete one of `owner_id`'s bookmarks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such bookmark belongs to the owner.
    async fn delete_by_id(&self, owner_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    /// Open a change subscription scoped to `owner_id`.
    fn subscribe(&self, owner_id: Uuid, mask: EventMask) -> Subscription;

    /// Tear down a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
