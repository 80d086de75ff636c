//! Bookmark entry view: one bookmark as a card, plus deletion.
//!
//! Thumbnails are derived purely from the URL: video links get the video's
//! still image, everything else gets a favicon keyed by host, and unparsable
//! URLs get a fixed icon. If the derived image fails to load, the card swaps
//! to the favicon once and never again.
//!
//! Delete does not touch any cached list. The sync view sees the removal when
//! its subscription fires and it re-fetches.

use serde::Serialize;
use tracing::error;
use url::Url;
use uuid::Uuid;

use crate::store::{Bookmark, BookmarkStore, StoreError};
use crate::views::notice::Notice;

pub const DEFAULT_ICON: &str = "https://www.google.com/favicon.ico";
const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";
const FAVICON_SIZE: u32 = 64;
const VIDEO_HOSTS: [&str; 2] = ["youtube.com", "youtu.be"];
const SHORT_LINK_HOST: &str = "youtu.be";

pub const MSG_DELETED: &str = "Bookmark deleted successfully";
pub const MSG_DELETE_FAILED: &str = "Failed to delete bookmark";

// =============================================================================
// THUMBNAILS
// =============================================================================

/// Favicon-service image for `host`.
#[must_use]
pub fn favicon_url(host: &str) -> String {
    format!("{FAVICON_SERVICE}?domain={host}&sz={FAVICON_SIZE}")
}

/// Still image for a video id.
#[must_use]
pub fn video_thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{video_id}/hqdefault.jpg")
}

/// Video id from a short link path or the `v` query parameter.
fn video_id(url: &Url, host: &str) -> Option<String> {
    let id = if host.contains(SHORT_LINK_HOST) {
        url.path().trim_start_matches('/').to_owned()
    } else {
        url.query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())?
    };
    (!id.is_empty()).then_some(id)
}

/// Preview image for a bookmark URL. Never fails.
#[must_use]
pub fn derive_thumbnail(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return DEFAULT_ICON.to_owned();
    };
    let host = url.host_str().unwrap_or_default();

    if VIDEO_HOSTS.iter().any(|h| host.contains(h)) {
        if let Some(id) = video_id(&url, host) {
            return video_thumbnail_url(&id);
        }
    }
    favicon_url(host)
}

/// Host shown on the card; the raw URL when it does not parse.
#[must_use]
pub fn display_domain(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| raw.to_owned())
}

// =============================================================================
// CARD
// =============================================================================

/// Render state for one bookmark.
#[derive(Debug, Clone)]
pub struct EntryCard {
    bookmark: Bookmark,
    domain: String,
    image_src: String,
    fallback_used: bool,
}

impl EntryCard {
    #[must_use]
    pub fn new(bookmark: Bookmark) -> Self {
        let domain = display_domain(&bookmark.url);
        let image_src = derive_thumbnail(&bookmark.url);
        Self { bookmark, domain, image_src, fallback_used: false }
    }

    #[must_use]
    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn image_src(&self) -> &str {
        &self.image_src
    }

    /// Image used after a load failure.
    #[must_use]
    pub fn fallback_src(&self) -> String {
        favicon_url(&self.domain)
    }

    /// Record an image load failure. Returns the replacement source the first
    /// time only; later failures leave the card as is.
    pub fn on_image_error(&mut self) -> Option<&str> {
        if self.fallback_used {
            return None;
        }
        self.fallback_used = true;
        self.image_src = self.fallback_src();
        Some(&self.image_src)
    }

    /// Delete this card's bookmark on behalf of `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns the store error; nothing is rolled back because nothing was
    /// removed locally.
    pub async fn delete(&self, store: &dyn BookmarkStore, owner_id: Uuid) -> Result<(), StoreError> {
        delete_bookmark(store, owner_id, self.bookmark.id).await
    }

    #[must_use]
    pub fn to_response(&self) -> BookmarkCardResponse {
        BookmarkCardResponse {
            id: self.bookmark.id,
            title: self.bookmark.title.clone(),
            url: self.bookmark.url.clone(),
            created_at: self.bookmark.created_at_rfc3339(),
            domain: self.domain.clone(),
            thumbnail: self.image_src.clone(),
            fallback_thumbnail: self.fallback_src(),
        }
    }
}

/// Wire shape of a card, shared by REST and realtime snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkCardResponse {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub domain: String,
    pub thumbnail: String,
    pub fallback_thumbnail: String,
}

/// Issue a delete-by-id request for one of `owner_id`'s bookmarks.
///
/// # Errors
///
/// Returns the store error, logged here.
pub async fn delete_bookmark(store: &dyn BookmarkStore, owner_id: Uuid, id: Uuid) -> Result<(), StoreError> {
    store.delete_by_id(owner_id, id).await.map_err(|e| {
        error!(%owner_id, %id, error = %e, "bookmark delete failed");
        e
    })
}

/// Toast for a delete outcome.
#[must_use]
pub fn delete_notice(result: &Result<(), StoreError>) -> Notice {
    match result {
        Ok(()) => Notice::success(MSG_DELETED),
        Err(_) => Notice::error(MSG_DELETE_FAILED),
    }
}

#[cfg(test)]
#[path = "entry_test.rs"]
mod tests;
