//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool (sessions, users), the bookmark store behind its
//! trait, the session-change fan-out, and the loaded configuration.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::services::session::SessionEvents;
use crate::store::BookmarkStore;

/// Shared application state. Clone is required by Axum; every field is
/// `Arc`-wrapped or cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn BookmarkStore>,
    pub sessions: SessionEvents,
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, store: Arc<dyn BookmarkStore>, config: AppConfig) -> Self {
        Self { pool, store, sessions: SessionEvents::new(), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::config::test_support::test_config;
    use crate::store::memory::MemoryBookmarkStore;
    use sqlx::postgres::PgPoolOptions;

    /// Create a test `AppState` with a dummy `PgPool` (`connect_lazy`, no live
    /// DB) and an in-memory bookmark store. Returns the store for seeding.
    #[must_use]
    pub fn test_app_state() -> (AppState, Arc<MemoryBookmarkStore>) {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("connect_lazy should not fail");
        let store = Arc::new(MemoryBookmarkStore::new());
        (AppState::new(pool, store.clone(), config), store)
    }
}
