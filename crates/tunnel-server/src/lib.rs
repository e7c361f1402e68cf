//! Tunnel server.
//!
//! Accepts X25519 key exchanges over HTTP, keeps one [`store::SessionRecord`]
//! per session and serves EAPI-authenticated, AES-256-GCM encrypted actions.

pub mod api;
pub mod audit;
pub mod config;
pub mod controller;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod replay;
pub mod store;

pub use api::router;
pub use config::ServerArgs;
pub use controller::{
    default_handler, spawn_session_sweeper, ActionHandler, ControllerConfig, SessionController,
};
pub use error::ApiError;
pub use keys::ServerKeyStore;
pub use store::{MemorySessionStore, SessionRecord, SessionStore, SqliteSessionStore, StoreError};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Open the database and apply migrations.
pub async fn connect_database(database_url: &str) -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    store::migrate(&pool).await?;
    Ok(pool)
}

/// Bind the HTTP listener on exactly `addr`.
///
/// Clients are configured with a fixed server URL, so an occupied port is an
/// error rather than a reason to pick another one.
pub async fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}
