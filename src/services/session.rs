//! Sessions, websocket tickets, and session-change notifications.
//!
//! ARCHITECTURE
//! ============
//! HTTP auth uses long-lived session tokens in an HttpOnly cookie. Websocket
//! upgrades use one-time short-lived tickets bound to the session that minted
//! them, so a realtime connection knows which session it belongs to.
//!
//! Logout publishes a `SessionChange` on an in-process broadcast channel;
//! realtime connections bound to that session shut themselves down.
//!
//! TRADE-OFFS
//! ==========
//! Ticket consumption is destructive (`DELETE ... RETURNING`) to guarantee
//! single use; this favors replay safety over reconnect convenience.

use std::fmt::Write;

use rand::Rng;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use uuid::Uuid;

const SESSION_EVENT_CAPACITY: usize = 64;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Generate a short-lived 16-byte hex WS ticket.
#[must_use]
pub(crate) fn generate_ws_ticket() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// The authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionUser {
    /// Owner identifier used to scope every bookmark query.
    pub id: Uuid,
    pub email: Option<String>,
    /// Display name.
    pub name: String,
    pub avatar_url: Option<String>,
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Create a session for the given user, returning the token.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query("INSERT INTO sessions (token, user_id) VALUES ($1, $2)")
        .bind(&token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
///
/// # Errors
///
/// Returns a database error if the lookup fails.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.email, u.name, u.avatar_url
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        id: r.get("id"),
        email: r.get("email"),
        name: r.get("name"),
        avatar_url: r.get("avatar_url"),
    }))
}

/// Delete a session by token.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

// =============================================================================
// WS TICKETS
// =============================================================================

/// Create a short-lived WS ticket bound to `session_token`.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_ws_ticket(pool: &PgPool, user_id: Uuid, session_token: &str) -> Result<String, sqlx::Error> {
    let ticket = generate_ws_ticket();
    sqlx::query("INSERT INTO ws_tickets (ticket, user_id, session_token) VALUES ($1, $2, $3)")
        .bind(&ticket)
        .bind(user_id)
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(ticket)
}

/// Consume a WS ticket atomically, returning `(user_id, session_token)` if valid.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn consume_ws_ticket(pool: &PgPool, ticket: &str) -> Result<Option<(Uuid, String)>, sqlx::Error> {
    let row = sqlx::query(
        "DELETE FROM ws_tickets WHERE ticket = $1 AND expires_at > now() RETURNING user_id, session_token",
    )
    .bind(ticket)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("user_id"), r.get("session_token"))))
}

// =============================================================================
// SESSION CHANGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// The session identified by `token` was signed out.
    Ended { user_id: Uuid, token: String },
}

impl SessionChange {
    /// Whether this change terminates the session `token`.
    #[must_use]
    pub fn ends(&self, token: &str) -> bool {
        match self {
            Self::Ended { token: ended, .. } => ended == token,
        }
    }
}

/// In-process fan-out of session changes.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionChange>,
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { tx }
    }

    /// Announce that `token` was signed out. Returns the number of listeners reached.
    pub fn publish_ended(&self, user_id: Uuid, token: &str) -> usize {
        self.tx
            .send(SessionChange::Ended { user_id, token: token.to_owned() })
            .unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.tx.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
