//! Environment configuration.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` loads `.env` (if present) and then builds one `AppConfig`. Optional
//! integrations (Google OAuth) are `None` when their variables are missing,
//! which disables the corresponding routes instead of failing startup.

use std::time::Duration;

use crate::services::auth::GoogleConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CHANGE_QUEUE_CAPACITY: usize = 32;
const DEFAULT_SESSION_RECHECK_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub google: Option<GoogleConfig>,
    /// Whether session/OAuth cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
    /// Per-subscription change queue depth.
    pub change_queue_capacity: usize,
    /// How often a realtime connection re-validates its session.
    pub session_recheck: Duration,
    /// Absolute origin prepended to post-login redirects, e.g. `https://marks.example.com`.
    pub public_origin: Option<String>,
}

impl AppConfig {
    /// Build the configuration from process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or `PORT` is not a port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        let google = GoogleConfig::from_env();
        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| {
            google
                .as_ref()
                .is_some_and(|g| g.redirect_uri.starts_with("https://"))
        });

        Ok(Self {
            database_url,
            port,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            google,
            cookie_secure,
            change_queue_capacity: env_parse("CHANGE_QUEUE_CAPACITY", DEFAULT_CHANGE_QUEUE_CAPACITY),
            session_recheck: Duration::from_secs(
                env_parse("SESSION_RECHECK_SECS", DEFAULT_SESSION_RECHECK_SECS).max(1),
            ),
            public_origin: std::env::var("PUBLIC_ORIGIN")
                .ok()
                .map(|o| o.trim().trim_end_matches('/').to_owned())
                .filter(|o| !o.is_empty()),
        })
    }

    /// Prefix `path` with the public origin, if one is configured.
    #[must_use]
    pub fn absolute(&self, path: &str) -> String {
        match &self.public_origin {
            Some(origin) => format!("{origin}{path}"),
            None => path.to_owned(),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}


#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
