use super::*;
use crate::frame::Status;
use crate::state::test_helpers::test_app_state;
use crate::store::memory::MemoryBookmarkStore;
use crate::views::creation::{MSG_ADDED, MSG_MISSING_FIELDS};
use crate::views::entry::{MSG_DELETE_FAILED, MSG_DELETED, favicon_url};
use tokio::time::{Duration, timeout};

fn request_text(syscall: &str, data: serde_json::Value) -> String {
    let data: Data = serde_json::from_value(data).unwrap();
    serde_json::to_string(&Frame::request(syscall, data)).unwrap()
}

async fn open_connection() -> (Connection, Arc<MemoryBookmarkStore>, Uuid) {
    let (state, store) = test_app_state();
    let owner = Uuid::new_v4();
    store.seed(owner, "Rust", "https://rust-lang.org", 20);
    store.seed(owner, "Tokio", "https://tokio.rs", 10);
    let mut conn = Connection::new(&state, owner, "tok".into());
    conn.open().await;
    (conn, store, owner)
}

/// Drive one change event through the connection and return the resulting snapshot.
async fn snapshot_after_change(conn: &mut Connection) -> Frame {
    let event = timeout(Duration::from_millis(200), conn.view.next_change())
        .await
        .expect("change receive timed out")
        .expect("subscription closed");
    let pending = conn.on_change(event).expect("fetch should start");
    let (ticket, result) = pending.await;
    conn.finish_fetch(ticket, result).expect("snapshot expected")
}

fn titles(frame: &Frame) -> Vec<String> {
    frame.data["bookmarks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap().to_owned())
        .collect()
}

// =============================================================================
// open
// =============================================================================

#[tokio::test]
async fn open_sends_welcome_then_snapshot() {
    let (state, store) = test_app_state();
    let owner = Uuid::new_v4();
    store.seed(owner, "Only", "https://only.example", 1);
    let mut conn = Connection::new(&state, owner, "tok".into());

    let frames = conn.open().await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].syscall, "session:connected");
    assert_eq!(frames[0].data_str("user_id"), Some(owner.to_string().as_str()));
    assert_eq!(frames[1].syscall, "bookmarks:snapshot");
    assert_eq!(frames[1].data["total"], 1);
    assert_eq!(frames[1].data["stale"], false);
    assert_eq!(store.hub().subscriber_count(owner), 1);
}

#[tokio::test]
async fn open_with_failing_store_sends_stale_empty_snapshot() {
    let (state, store) = test_app_state();
    store.fail_next_lists(1);
    let mut conn = Connection::new(&state, Uuid::new_v4(), "tok".into());

    let frames = conn.open().await;

    assert_eq!(frames[1].data["total"], 0);
    assert_eq!(frames[1].data["stale"], true);
}

// =============================================================================
// search
// =============================================================================

#[tokio::test]
async fn search_filters_without_fetching() {
    let (mut conn, store, _owner) = open_connection().await;
    let calls_before = store.list_calls();
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(&request_text("bookmarks:search", serde_json::json!({"query": "TOK"})), &mut pending)
        .await;

    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(titles(&replies[0]), vec!["Tokio"]);
    assert_eq!(replies[0].data["total"], 2);
    assert_eq!(store.list_calls(), calls_before);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn query_survives_later_snapshots() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();
    conn.handle_text(&request_text("bookmarks:search", serde_json::json!({"query": "rust"})), &mut pending)
        .await;

    conn.handle_text(&request_text("bookmarks:refresh", serde_json::json!({})), &mut pending)
        .await;
    let (ticket, result) = pending.next().await.unwrap();
    let snapshot = conn.finish_fetch(ticket, result).unwrap();

    assert_eq!(titles(&snapshot), vec!["Rust"]);
    assert_eq!(snapshot.data["query"], "rust");
}

// =============================================================================
// create / delete
// =============================================================================

#[tokio::test]
async fn create_replies_with_notice_and_change_triggers_snapshot() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(
            &request_text("bookmark:create", serde_json::json!({"title": "Docs", "url": "docs.rs"})),
            &mut pending,
        )
        .await;

    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["notice"]["message"], MSG_ADDED);
    assert_eq!(replies[0].data["bookmark"]["url"], "https://docs.rs");

    let snapshot = snapshot_after_change(&mut conn).await;
    assert_eq!(titles(&snapshot), vec!["Docs", "Tokio", "Rust"]);
}

#[tokio::test]
async fn create_with_blank_fields_is_error_with_notice() {
    let (mut conn, store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(&request_text("bookmark:create", serde_json::json!({"title": "", "url": ""})), &mut pending)
        .await;

    assert_eq!(replies[0].status, Status::Error);
    assert_eq!(replies[0].data_str("code"), Some("E_MISSING_FIELDS"));
    assert_eq!(replies[0].data["notice"]["message"], MSG_MISSING_FIELDS);
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn delete_replies_and_change_removes_card() {
    let (mut conn, _store, _owner) = open_connection().await;
    let id = conn.view.bookmarks()[0].id;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(&request_text("bookmark:delete", serde_json::json!({"id": id.to_string()})), &mut pending)
        .await;

    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data["notice"]["message"], MSG_DELETED);
    let snapshot = snapshot_after_change(&mut conn).await;
    assert_eq!(snapshot.data["total"], 1);
}

#[tokio::test]
async fn delete_of_unknown_id_is_error() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(
            &request_text("bookmark:delete", serde_json::json!({"id": Uuid::new_v4().to_string()})),
            &mut pending,
        )
        .await;

    assert_eq!(replies[0].status, Status::Error);
    assert_eq!(replies[0].data_str("code"), Some("E_BOOKMARK_NOT_FOUND"));
    assert_eq!(replies[0].data["notice"]["message"], MSG_DELETE_FAILED);
}

#[tokio::test]
async fn delete_without_id_is_error() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(&request_text("bookmark:delete", serde_json::json!({})), &mut pending)
        .await;

    assert_eq!(replies[0].status, Status::Error);
    assert_eq!(replies[0].data_str("message"), Some("id required"));
}

// =============================================================================
// dispatch errors
// =============================================================================

#[tokio::test]
async fn invalid_json_yields_gateway_error() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn.handle_text("{not json", &mut pending).await;

    assert_eq!(replies[0].syscall, "gateway:error");
}

#[tokio::test]
async fn unknown_syscall_is_error() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(&request_text("board:join", serde_json::json!({})), &mut pending)
        .await;

    assert_eq!(replies[0].status, Status::Error);
}

// =============================================================================
// fetch ordering / failure
// =============================================================================

#[tokio::test]
async fn failed_refresh_keeps_list_and_marks_stale() {
    let (mut conn, store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();
    store.fail_next_lists(1);

    conn.handle_text(&request_text("bookmarks:refresh", serde_json::json!({})), &mut pending)
        .await;
    let (ticket, result) = pending.next().await.unwrap();
    let snapshot = conn.finish_fetch(ticket, result).unwrap();

    assert_eq!(snapshot.data["total"], 2);
    assert_eq!(snapshot.data["stale"], true);
}

#[tokio::test]
async fn superseded_fetch_produces_no_snapshot() {
    let (mut conn, _store, _owner) = open_connection().await;
    let first = conn.view.fetch().unwrap();
    let second = conn.view.fetch().unwrap();

    let (t2, r2) = second.await;
    assert!(conn.finish_fetch(t2, r2).is_some());
    let (t1, r1) = first.await;
    assert!(conn.finish_fetch(t1, r1).is_none());
}

// =============================================================================
// session end
// =============================================================================

#[tokio::test]
async fn end_session_redirects_and_unsubscribes() {
    let (mut conn, store, owner) = open_connection().await;

    let frame = conn.end_session();

    assert_eq!(frame.syscall, "session:ended");
    assert_eq!(frame.data_str("redirect"), Some("/"));
    assert!(!conn.view.is_subscribed());
    assert_eq!(store.hub().subscriber_count(owner), 0);
}

#[tokio::test]
async fn fetch_after_session_end_is_discarded() {
    let (mut conn, _store, _owner) = open_connection().await;
    let pending = conn.view.fetch().unwrap();
    conn.end_session();

    let (ticket, result) = pending.await;

    assert!(conn.finish_fetch(ticket, result).is_none());
    assert!(conn.view.bookmarks().is_empty());
}

#[test]
fn logout_of_this_token_ends_connection() {
    let events = session::SessionEvents::new();
    let mut rx = events.subscribe();
    events.publish_ended(Uuid::new_v4(), "tok");
    let change = rx.try_recv().unwrap();
    assert!(change.ends("tok"));
    assert!(!change.ends("other"));
}

#[tokio::test]
async fn terminal_inbound_frames_are_ignored() {
    let (mut conn, store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();
    let req = Frame::request("bookmark:create", Data::new());
    let done = req.done_with(Data::new());

    let replies = conn
        .handle_text(&serde_json::to_string(&done).unwrap(), &mut pending)
        .await;

    assert!(replies.is_empty());
    assert_eq!(store.write_calls(), 0);
}

// =============================================================================
// image fallback
// =============================================================================

#[tokio::test]
async fn image_error_falls_back_once_per_card() {
    let (state, store) = test_app_state();
    let owner = Uuid::new_v4();
    let row = store.seed(owner, "Clip", "https://youtu.be/abc123", 1);
    let mut conn = Connection::new(&state, owner, "tok".into());
    conn.open().await;
    let mut pending = FuturesUnordered::new();
    let report = request_text("bookmark:image-error", serde_json::json!({"id": row.id.to_string()}));

    let first = conn.handle_text(&report, &mut pending).await;
    assert_eq!(first[0].status, Status::Done);
    assert_eq!(first[0].data["changed"], true);
    assert_eq!(first[0].data["thumbnail"], favicon_url("youtu.be"));

    let second = conn.handle_text(&report, &mut pending).await;
    assert_eq!(second[0].status, Status::Done);
    assert_eq!(second[0].data["changed"], false);
    assert_eq!(second[0].data["thumbnail"], favicon_url("youtu.be"));
}

#[tokio::test]
async fn image_fallback_survives_refetch() {
    let (state, store) = test_app_state();
    let owner = Uuid::new_v4();
    let row = store.seed(owner, "Clip", "https://youtu.be/abc123", 1);
    let mut conn = Connection::new(&state, owner, "tok".into());
    conn.open().await;
    let mut pending = FuturesUnordered::new();
    conn.handle_text(
        &request_text("bookmark:image-error", serde_json::json!({"id": row.id.to_string()})),
        &mut pending,
    )
    .await;

    conn.handle_text(&request_text("bookmarks:refresh", serde_json::json!({})), &mut pending)
        .await;
    let (ticket, result) = pending.next().await.unwrap();
    let snapshot = conn.finish_fetch(ticket, result).unwrap();

    assert_eq!(snapshot.data["bookmarks"][0]["thumbnail"], favicon_url("youtu.be"));
    assert_eq!(snapshot.data["loading"], false);
}

#[tokio::test]
async fn image_error_for_unknown_card_is_error() {
    let (mut conn, _store, _owner) = open_connection().await;
    let mut pending = FuturesUnordered::new();

    let replies = conn
        .handle_text(
            &request_text("bookmark:image-error", serde_json::json!({"id": Uuid::new_v4().to_string()})),
            &mut pending,
        )
        .await;

    assert_eq!(replies[0].status, Status::Error);
}

#[tokio::test]
async fn resync_event_triggers_refetch() {
    let (mut conn, store, _owner) = open_connection().await;
    let calls_before = store.list_calls();

    assert_eq!(store.hub().publish_resync(), 1);
    let snapshot = snapshot_after_change(&mut conn).await;

    assert_eq!(store.list_calls(), calls_before + 1);
    assert_eq!(snapshot.data["total"], 2);
}
