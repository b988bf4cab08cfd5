mod error;
mod extractors;
mod handlers;
mod routes;
pub mod security;
mod state;

pub use state::AppState;

use crate::services::auth;
use crate::{Config, Database};
use anyhow::Result;
use axum::extract::Request;
use axum::middleware;
use axum::{Router, ServiceExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::compression::CompressionLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The application router with all route groups and response layers.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(routes::catalog_routes())
        .merge(routes::manage_routes(state.max_upload_bytes))
        .merge(routes::student_routes())
        .merge(routes::account_routes())
        .merge(routes::admin_routes())
        .merge(routes::api_routes());

    if state.config.media.serve {
        app = app.merge(routes::media_routes());
    }

    app.layer(middleware::from_fn(security::apply_security_headers))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn purge_sessions(db: Database) {
    let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        match auth::cleanup_expired_sessions(&db) {
            Ok(0) => {}
            Ok(n) => tracing::info!("Removed {} expired sessions", n),
            Err(e) => tracing::error!("Session cleanup failed: {}", e),
        }
    }
}

pub async fn serve(config: Config, db: Database, addr: &str) -> Result<()> {
    let state = Arc::new(AppState::new(config, db.clone())?);
    tokio::spawn(purge_sessions(db));

    let limiter_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            limiter_state.login_limiter.cleanup();
            limiter_state.cache.cleanup();
        }
    });

    // Trailing slashes are trimmed before routing, so `/courses/` is `/courses`.
    let app = NormalizePathLayer::trim_trailing_slash().layer(router(state));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;

    Ok(())
}
