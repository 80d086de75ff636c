//! Bookmark routes: REST access to the dashboard list, creation and deletion.
//!
//! DESIGN
//! ======
//! Handlers are thin: they authenticate, delegate to the view layer, and map
//! outcomes to status codes. Failures carry the same `notice` the realtime
//! connection would show, so clients render one toast vocabulary.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::auth::{AuthUser, session_from_jar};
use crate::state::AppState;
use crate::store::StoreError;
use crate::views::creation::CreationForm;
use crate::views::entry::{self, EntryCard};
use crate::views::shell::{Navigation, Shell};
use crate::views::sync::filter_bookmarks;

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Unavailable(_) | StoreError::Database(_) => StatusCode::BAD_GATEWAY,
    }
}

fn notice_body(notice: &crate::views::notice::Notice) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "notice": notice.to_json() }))
}

// =============================================================================
// SHELL
// =============================================================================

/// `GET /dashboard`: gate the dashboard on a live session.
pub async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> Result<Response, StatusCode> {
    let session = session_from_jar(&state, &jar).await?;
    let (shell, nav) = Shell::mount(session.map(|auth| auth.user));
    let Some(user) = shell.user() else {
        let target = match nav {
            Navigation::Redirect(target) => target,
            Navigation::Stay => crate::views::shell::SIGNED_OUT_TARGET,
        };
        return Ok(Redirect::temporary(target).into_response());
    };

    let total = match state.store.list(user.id).await {
        Ok(rows) => Some(rows.len()),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "dashboard bookmark count failed");
            None
        }
    };
    Ok(Json(serde_json::json!({ "email": shell.display_label(), "total": total })).into_response())
}

// =============================================================================
// LIST
// =============================================================================

#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(default)]
    q: String,
}

/// `GET /api/bookmarks?q=`: the caller's bookmarks as cards, newest first.
pub async fn list_bookmarks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let rows = state.store.list(auth.user.id).await.map_err(|e| {
        warn!(user_id = %auth.user.id, error = %e, "bookmark list failed");
        store_error_to_status(&e)
    })?;

    let cards: Vec<_> = filter_bookmarks(&rows, &params.q)
        .into_iter()
        .map(|b| EntryCard::new(b.clone()).to_response())
        .collect();
    Ok(Json(serde_json::json!({
        "bookmarks": cards,
        "total": rows.len(),
        "query": params.q,
    })))
}

// =============================================================================
// CREATE
// =============================================================================

#[derive(Deserialize)]
pub struct CreateBookmarkBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

/// `POST /api/bookmarks`: validate and insert one bookmark.
pub async fn create_bookmark(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateBookmarkBody>,
) -> Response {
    let mut form = CreationForm::new(body.title, body.url);
    let (result, notice) = form
        .submit_with_notice(state.store.as_ref(), Some(auth.user.id))
        .await;

    match result {
        Ok(bookmark) => {
            let card = EntryCard::new(bookmark).to_response();
            let body = serde_json::json!({ "bookmark": card, "notice": notice.to_json() });
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(crate::views::creation::CreateError::Store(_)) => {
            (StatusCode::BAD_GATEWAY, notice_body(&notice)).into_response()
        }
        Err(_) => (StatusCode::BAD_REQUEST, notice_body(&notice)).into_response(),
    }
}

// =============================================================================
// DELETE
// =============================================================================

/// `DELETE /api/bookmarks/{id}`: delete one of the caller's bookmarks.
pub async fn delete_bookmark(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Response {
    let result = entry::delete_bookmark(state.store.as_ref(), auth.user.id, id).await;
    let notice = entry::delete_notice(&result);
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (store_error_to_status(&e), notice_body(&notice)).into_response(),
    }
}

#[cfg(test)]
#[path = "bookmarks_test.rs"]
mod tests;
