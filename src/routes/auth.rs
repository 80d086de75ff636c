//! Auth routes: Google OAuth flow, session management, WS tickets.

use axum::extract::{FromRef, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::{error, info, warn};

use crate::services::{auth as auth_svc, session};
use crate::state::AppState;
use crate::views::notice::Notice;
use crate::views::shell::{MSG_SIGNED_OUT, SIGNED_IN_TARGET, SIGNED_OUT_TARGET};

pub(crate) const COOKIE_NAME: &str = "session_token";
const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

fn cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut c = cookie(name, String::new(), secure);
    c.set_max_age(Duration::ZERO);
    c
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let app_state = AppState::from_ref(state);
        session_from_jar(&app_state, &jar)
            .await?
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Resolve the session cookie, if any. `Ok(None)` means signed out.
pub(crate) async fn session_from_jar(state: &AppState, jar: &CookieJar) -> Result<Option<AuthUser>, StatusCode> {
    let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
    if token.is_empty() {
        return Ok(None);
    }

    let user = session::validate_session(&state.pool, token)
        .await
        .map_err(|e| {
            error!(error = %e, "session validation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(user.map(|user| AuthUser { user, token: token.to_owned() }))
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /auth/google`: redirect to the Google consent screen.
pub async fn google_redirect(State(state): State<AppState>) -> Response {
    let Some(config) = &state.config.google else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google OAuth not configured").into_response();
    };

    let oauth_state = session::generate_token();
    let authorize_url = match config.authorize_url(&oauth_state) {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "failed to build authorize url");
            return (StatusCode::INTERNAL_SERVER_ERROR, "OAuth misconfigured").into_response();
        }
    };

    let mut state_cookie = cookie(OAUTH_STATE_COOKIE_NAME, oauth_state, state.config.cookie_secure);
    state_cookie.set_max_age(Duration::minutes(OAUTH_STATE_TTL_MINUTES));

    let jar = CookieJar::new().add(state_cookie);
    (jar, Redirect::temporary(&authorize_url)).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// `GET /auth/callback`: exchange code, upsert user, set cookie, redirect to the dashboard.
///
/// A callback without a code (e.g. consent denied) redirects straight to the
/// dashboard, whose shell bounces signed-out visitors back to `/`.
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let dashboard = state.config.absolute(SIGNED_IN_TARGET);
    let Some(code) = params.code.as_deref() else {
        warn!("oauth callback without code");
        return Redirect::temporary(&dashboard).into_response();
    };
    let Some(config) = &state.config.google else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Google OAuth not configured").into_response();
    };
    let secure = state.config.cookie_secure;

    // Verify OAuth CSRF state from cookie.
    let Some(callback_state) = params.state.as_deref() else {
        return (StatusCode::BAD_REQUEST, "missing oauth state").into_response();
    };
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(Cookie::value)
        .unwrap_or_default();
    if expected_state.is_empty() || expected_state != callback_state {
        return (StatusCode::UNAUTHORIZED, "invalid oauth state").into_response();
    }

    let access_token = match auth_svc::exchange_code(config, code).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "oauth code exchange failed");
            return (StatusCode::BAD_GATEWAY, "OAuth code exchange failed").into_response();
        }
    };

    let profile = match auth_svc::fetch_google_user(&access_token).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "google profile fetch failed");
            return (StatusCode::BAD_GATEWAY, "Failed to fetch Google profile").into_response();
        }
    };

    let user_id = match auth_svc::upsert_user(&state.pool, &profile).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "user upsert failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user").into_response();
        }
    };

    let token = match session::create_session(&state.pool, user_id).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "session creation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session").into_response();
        }
    };

    info!(%user_id, "user signed in");
    let jar = jar
        .add(cookie(COOKIE_NAME, token, secure))
        .add(expired_cookie(OAUTH_STATE_COOKIE_NAME, secure));
    (jar, Redirect::temporary(&dashboard)).into_response()
}

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: delete session, notify live connections, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Response {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        warn!(error = %e, user_id = %auth.user.id, "session delete failed during logout");
    }
    state.sessions.publish_ended(auth.user.id, &auth.token);
    info!(user_id = %auth.user.id, "user signed out");

    signed_out_response(state.config.cookie_secure)
}

/// Cleared session cookie plus the sign-out toast and where to go next.
fn signed_out_response(secure: bool) -> Response {
    let jar = CookieJar::new().add(expired_cookie(COOKIE_NAME, secure));
    let body = serde_json::json!({
        "notice": Notice::success(MSG_SIGNED_OUT).to_json(),
        "redirect": SIGNED_OUT_TARGET,
    });
    (jar, Json(body)).into_response()
}

/// `POST /api/auth/ws-ticket`: create a one-time WS ticket for this session.
pub async fn ws_ticket(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session::create_ws_ticket(&state.pool, auth.user.id, &auth.token)
        .await
        .map_err(|e| {
            error!(error = %e, "ws ticket creation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
