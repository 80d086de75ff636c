//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the OAuth endpoints, the dashboard shell, the bookmark REST API and
//! the realtime websocket under a single Axum router.

pub mod auth;
pub mod bookmarks;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/google", get(auth::google_redirect))
        .route("/auth/callback", get(auth::oauth_callback))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/ws-ticket", post(auth::ws_ticket))
        .route("/dashboard", get(bookmarks::dashboard))
        .route("/api/bookmarks", get(bookmarks::list_bookmarks).post(bookmarks::create_bookmark))
        .route("/api/bookmarks/{id}", delete(bookmarks::delete_bookmark))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
