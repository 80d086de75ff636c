//! WebSocket handler: realtime dashboard connection.
//!
//! DESIGN
//! ======
//! Each connection owns one `SyncView` mounted for the ticket's user. The
//! `select!` loop multiplexes:
//! - Incoming client frames → parse + dispatch by syscall
//! - Store change events → start a re-fetch
//! - Completed fetches → apply, then push a `bookmarks:snapshot`
//! - Session changes (logout, periodic re-check) → `session:ended` + close
//!
//! Fetches run in a `FuturesUnordered` so a slow list query never blocks the
//! socket. Out-of-order completions are resolved by the view's fetch tickets.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `session:connected`, initial `bookmarks:snapshot`
//! 2. Client frames → reply `done`/`error` carrying a `notice`
//!    (`bookmark:image-error` swaps a card to its favicon, once)
//! 3. Changes → re-fetch → snapshot
//! 4. Close or session end → unmount view (unsubscribes)

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::services::session;
use crate::state::AppState;
use crate::store::{BookmarkStore, ChangeEvent, StoreError};
use crate::views::creation::CreationForm;
use crate::views::entry::{self, EntryCard};
use crate::views::shell::SIGNED_OUT_TARGET;
use crate::views::sync::{FetchOutcome, FetchTicket, PendingFetch, SyncPhase, SyncView};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let (user_id, session_token) = match session::consume_ws_ticket(&state.pool, ticket).await {
        Ok(Some(pair)) => pair,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id, session_token))
}

// =============================================================================
// CONNECTION STATE
// =============================================================================

/// Per-socket state, kept free of transport so it can be driven from tests.
pub(crate) struct Connection {
    view: SyncView,
    store: Arc<dyn BookmarkStore>,
    user_id: Uuid,
    session_token: String,
    query: String,
    /// Render state per cached bookmark; survives re-fetches while the row does.
    cards: HashMap<Uuid, EntryCard>,
}

impl Connection {
    pub(crate) fn new(state: &AppState, user_id: Uuid, session_token: String) -> Self {
        Self {
            view: SyncView::new(Arc::clone(&state.store)),
            store: Arc::clone(&state.store),
            user_id,
            session_token,
            query: String::new(),
            cards: HashMap::new(),
        }
    }

    /// Mount the view and produce the greeting frames.
    pub(crate) async fn open(&mut self) -> Vec<Frame> {
        if let Err(e) = self.view.mount(self.user_id).await {
            warn!(user_id = %self.user_id, error = %e, "initial bookmark load failed");
        }
        self.sync_cards();
        let welcome = Frame::request("session:connected", Data::new()).with_data("user_id", self.user_id.to_string());
        vec![welcome, self.snapshot()]
    }

    /// Detach from the store. Idempotent.
    pub(crate) fn close(&mut self) {
        self.view.unmount();
        self.cards.clear();
    }

    /// Rebuild card state from the cached list, keeping cards whose row is unchanged.
    fn sync_cards(&mut self) {
        let mut previous = std::mem::take(&mut self.cards);
        for bookmark in self.view.bookmarks() {
            let card = match previous.remove(&bookmark.id) {
                Some(card) if card.bookmark() == bookmark => card,
                _ => EntryCard::new(bookmark.clone()),
            };
            self.cards.insert(bookmark.id, card);
        }
    }

    fn snapshot_data(&self) -> Data {
        let cards: Vec<_> = self
            .view
            .filter(&self.query)
            .into_iter()
            .map(|b| {
                self.cards
                    .get(&b.id)
                    .map_or_else(|| EntryCard::new(b.clone()).to_response(), EntryCard::to_response)
            })
            .collect();

        let mut data = Data::new();
        data.insert("bookmarks".into(), serde_json::to_value(&cards).unwrap_or_default());
        data.insert("total".into(), serde_json::json!(self.view.bookmarks().len()));
        data.insert("query".into(), serde_json::json!(self.query));
        data.insert("stale".into(), serde_json::json!(self.view.last_error().is_some()));
        data.insert("loading".into(), serde_json::json!(self.view.phase() == SyncPhase::Loading));
        data
    }

    pub(crate) fn snapshot(&self) -> Frame {
        Frame::request("bookmarks:snapshot", self.snapshot_data())
    }

    /// A store change for this user: start a re-fetch.
    pub(crate) fn on_change(&mut self, event: ChangeEvent) -> Option<PendingFetch> {
        self.view.handle_change(event)
    }

    /// Apply a completed fetch. Returns a snapshot unless the result was superseded.
    pub(crate) fn finish_fetch(&mut self, ticket: FetchTicket, result: Result<Vec<crate::store::Bookmark>, StoreError>) -> Option<Frame> {
        match self.view.apply_fetch(ticket, result) {
            Ok(FetchOutcome::Stale) => None,
            Ok(FetchOutcome::Applied) => {
                self.sync_cards();
                Some(self.snapshot())
            }
            Err(_) => Some(self.snapshot()),
        }
    }

    /// Tear down after the session went away and tell the client where to go.
    pub(crate) fn end_session(&mut self) -> Frame {
        info!(user_id = %self.user_id, "session ended; closing realtime connection");
        self.close();
        Frame::request("session:ended", Data::new()).with_data("redirect", SIGNED_OUT_TARGET)
    }

    // =========================================================================
    // FRAME DISPATCH
    // =========================================================================

    /// Parse and handle one inbound text frame. Returns frames for the client;
    /// any fetch it starts is pushed onto `pending`.
    pub(crate) async fn handle_text(&mut self, text: &str, pending: &mut FuturesUnordered<PendingFetch>) -> Vec<Frame> {
        let req: Frame = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "ws: invalid inbound frame");
                let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
                return vec![err];
            }
        };
        if req.status.is_terminal() {
            debug!(user_id = %self.user_id, id = %req.id, "ws: ignoring terminal inbound frame");
            return Vec::new();
        }
        let req = req.with_from(self.user_id.to_string());
        debug!(user_id = %self.user_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

        match req.syscall.as_str() {
            "bookmarks:search" => {
                self.query = req.data_str("query").unwrap_or_default().to_owned();
                vec![req.done_with(self.snapshot_data())]
            }
            "bookmarks:refresh" => {
                pending.extend(self.view.fetch());
                vec![req.done_with(Data::new())]
            }
            "bookmark:create" => vec![self.create(&req).await],
            "bookmark:delete" => vec![self.delete(&req).await],
            "bookmark:image-error" => vec![self.image_error(&req)],
            other => vec![req.error(format!("unknown syscall: {other}"))],
        }
    }

    async fn create(&mut self, req: &Frame) -> Frame {
        let mut form = CreationForm::new(
            req.data_str("title").unwrap_or_default(),
            req.data_str("url").unwrap_or_default(),
        );
        let (result, notice) = form
            .submit_with_notice(self.store.as_ref(), Some(self.user_id))
            .await;

        match result {
            Ok(bookmark) => {
                let mut data = Data::new();
                data.insert(
                    "bookmark".into(),
                    serde_json::to_value(EntryCard::new(bookmark).to_response()).unwrap_or_default(),
                );
                data.insert("notice".into(), notice.to_json());
                req.done_with(data)
            }
            Err(e) => req.error_from(&e).with_data("notice", notice.to_json()),
        }
    }

    /// The client failed to load a card's image. The first report swaps in
    /// the favicon; later reports leave the card alone.
    fn image_error(&mut self, req: &Frame) -> Frame {
        let Some(id) = req.data_str("id").and_then(|s| s.parse::<Uuid>().ok()) else {
            return req.error("id required");
        };
        let Some(card) = self.cards.get_mut(&id) else {
            return req.error(format!("unknown bookmark: {id}"));
        };

        let replaced = card.on_image_error().is_some();
        if replaced {
            debug!(user_id = %self.user_id, %id, domain = card.domain(), "card image fell back to favicon");
        }
        let mut data = Data::new();
        data.insert("id".into(), serde_json::json!(id));
        data.insert("thumbnail".into(), serde_json::json!(card.image_src()));
        data.insert("changed".into(), serde_json::json!(replaced));
        req.done_with(data)
    }

    async fn delete(&mut self, req: &Frame) -> Frame {
        let Some(id) = req.data_str("id").and_then(|s| s.parse::<Uuid>().ok()) else {
            return req.error("id required");
        };

        let result = match self.view.find(id) {
            Some(cached) => EntryCard::new(cached.clone()).delete(self.store.as_ref(), self.user_id).await,
            None => entry::delete_bookmark(self.store.as_ref(), self.user_id, id).await,
        };
        let notice = entry::delete_notice(&result);
        match result {
            Ok(()) => {
                let mut data = Data::new();
                data.insert("notice".into(), notice.to_json());
                req.done_with(data)
            }
            Err(e) => req.error_from(&e).with_data("notice", notice.to_json()),
        }
    }
}

// =============================================================================
// SOCKET LOOP
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid, session_token: String) {
    let mut conn = Connection::new(&state, user_id, session_token);
    let mut sessions = state.sessions.subscribe();
    let mut pending: FuturesUnordered<PendingFetch> = FuturesUnordered::new();
    let period = state.config.session_recheck;
    let mut recheck = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    for frame in conn.open().await {
        if send_frame(&mut socket, &frame).await.is_err() {
            conn.close();
            return;
        }
    }
    info!(%user_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = conn.handle_text(text.as_str(), &mut pending).await;
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = conn.view.next_change(), if conn.view.is_subscribed() => {
                pending.extend(conn.on_change(event));
            }
            Some((ticket, result)) = pending.next(), if !pending.is_empty() => {
                if let Some(frame) = conn.finish_fetch(ticket, result) {
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
            }
            change = sessions.recv() => {
                match change {
                    Ok(change) if change.ends(&conn.session_token) => {
                        let _ = send_frame(&mut socket, &conn.end_session()).await;
                        break;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
            _ = recheck.tick() => {
                match session::validate_session(&state.pool, &conn.session_token).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        let _ = send_frame(&mut socket, &conn.end_session()).await;
                        break;
                    }
                    Err(e) => warn!(%user_id, error = %e, "ws: session re-check failed"),
                }
            }
        }
    }

    conn.close();
    info!(%user_id, "ws: client disconnected");
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, syscall = %frame.syscall, "ws: frame serialization failed");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
