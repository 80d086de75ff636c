mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;
mod store;
mod views;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    if config.google.is_none() {
        tracing::warn!("Google OAuth not configured: sign-in disabled");
    }

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    // Relay database change notifications into the in-process hub.
    let hub = store::ChangeHub::with_capacity(config.change_queue_capacity);
    let _listener = store::postgres::spawn_change_listener(pool.clone(), hub.clone());

    let bookmarks = Arc::new(store::postgres::PgBookmarkStore::new(pool.clone(), hub));
    let port = config.port;
    let state = state::AppState::new(pool, bookmarks, config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "smartmark listening");
    axum::serve(listener, app).await.expect("server failed");
}
