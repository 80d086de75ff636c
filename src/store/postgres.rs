//! Postgres-backed `BookmarkStore` and the change listener task.
//!
//! ARCHITECTURE
//! ============
//! Writes go straight to the `bookmarks` table. A row trigger emits
//! `pg_notify('bookmark_changes', ...)` for every insert/update/delete, and
//! `spawn_change_listener` relays those notifications into the shared
//! `ChangeHub`. Changes made by other server instances, or by hand in psql,
//! reach subscribers the same way as local writes.
//!
//! ERROR HANDLING
//! ==============
//! Undecodable payloads are logged and skipped. Listener connection loss is
//! logged; the loop sleeps and reconnects rather than exiting. Every
//! (re)attach publishes a resync, since notifications sent while detached
//! are lost.
//!
//! Pool exhaustion and transport failures map to `StoreError::Unavailable`;
//! everything else stays a `Database` error.

use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::{PgPool, Row};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Bookmark, BookmarkStore, ChangeEvent, ChangeHub, EventMask, NewBookmark, StoreError};
use super::{Subscription, SubscriptionHandle};

/// Notification channel written by the `bookmarks` row trigger.
pub const CHANGE_CHANNEL: &str = "bookmark_changes";

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct PgBookmarkStore {
    pool: PgPool,
    hub: ChangeHub,
}

impl PgBookmarkStore {
    #[must_use]
    pub fn new(pool: PgPool, hub: ChangeHub) -> Self {
        Self { pool, hub }
    }
}

/// Separate "database unreachable" from query failures.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn row_to_bookmark(row: &sqlx::postgres::PgRow) -> Bookmark {
    Bookmark {
        id: row.get("id"),
        owner_id: row.get("user_id"),
        title: row.get("title"),
        url: row.get("url"),
        created_at: row.get("created_at"),
    }
}

#[async_trait::async_trait]
impl BookmarkStore for PgBookmarkStore {
    async fn list(&self, owner_id: Uuid) -> Result<Vec<Bookmark>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, url, created_at
             FROM bookmarks
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(rows.iter().map(row_to_bookmark).collect())
    }

    async fn insert(&self, bookmark: NewBookmark) -> Result<Bookmark, StoreError> {
        let row = sqlx::query(
            "INSERT INTO bookmarks (user_id, title, url)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, title, url, created_at",
        )
        .bind(bookmark.owner_id)
        .bind(&bookmark.title)
        .bind(&bookmark.url)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row_to_bookmark(&row))
    }

    async fn delete_by_id(&self, owner_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn subscribe(&self, owner_id: Uuid, mask: EventMask) -> Subscription {
        self.hub.subscribe(owner_id, mask)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.hub.unsubscribe(handle);
    }
}

// =============================================================================
// CHANGE LISTENER
// =============================================================================

/// Decode a trigger payload (`{"op": "INSERT", "id": ..., "user_id": ...}`).
///
/// # Errors
///
/// Returns the JSON error if the payload does not match.
pub fn parse_change_payload(payload: &str) -> Result<ChangeEvent, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Spawn the LISTEN loop that feeds database notifications into `hub`.
pub fn spawn_change_listener(pool: PgPool, hub: ChangeHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listen(&pool, &hub).await {
                Ok(()) => return,
                Err(e) => {
                    error!(error = %e, "change listener failed; reconnecting");
                    tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                }
            }
        }
    })
}

async fn listen(pool: &PgPool, hub: &ChangeHub) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    info!(channel = CHANGE_CHANNEL, "change listener attached");
    // Anything committed before LISTEN took effect was not delivered.
    hub.publish_resync();

    loop {
        // `None` means the connection dropped; the next call reconnects, and
        // notifications sent in between are gone.
        let Some(notification) = listener.try_recv().await? else {
            warn!(channel = CHANGE_CHANNEL, "change listener connection lost; resyncing subscribers");
            hub.publish_resync();
            continue;
        };
        match parse_change_payload(notification.payload()) {
            Ok(event) => {
                hub.publish(event);
            }
            Err(e) => {
                warn!(error = %e, payload = notification.payload(), "undecodable change payload");
            }
        }
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
