//! HTTP API module for Memoapi
//!
//! REST endpoints for uploading, listing, searching, downloading,
//! updating and archiving memos.

mod auth;
mod rate_limit;
pub mod routes;

pub use auth::{hash_password, Credentials};
pub use rate_limit::RateLimiter;

use crate::error::{CoreError, InvalidInputKind, Result};
use crate::memo::MemoService;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing and form fields allowed on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub memos: Arc<MemoService>,
    /// Upload credentials; `None` rejects every protected request
    pub credentials: Option<Arc<Credentials>>,
    /// Per-IP limiter; `None` disables limiting
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Base URL for download links, otherwise derived from the Host header
    pub public_url: Option<String>,
}

/// Start the HTTP API server
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| CoreError::Api(e.to_string()))?;

    Ok(())
}

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - allow all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.memos.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    // Mutations require upload credentials
    let protected_routes = Router::new()
        .route(
            "/upload",
            post(routes::upload_memo).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/:id",
            patch(routes::update_memo).delete(routes::delete_memo),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_credentials,
        ));

    let public_routes = Router::new()
        .route("/memos", get(routes::list_memos))
        .route("/memos/search/:query", get(routes::search_memos))
        .route("/:id/pdf", get(routes::download_pdf));

    let memo_routes = public_routes
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ));

    Router::new()
        // Health check (no auth, no rate limit)
        .route("/health", get(routes::health))
        .nest("/memo", memo_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::InvalidInput {
                kind: InvalidInputKind::TooLarge,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound(..) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            // SQL details stay in the log
            CoreError::Persistence(_) => "Database error".to_string(),
            CoreError::Forbidden(_) => "Access denied".to_string(),
            CoreError::NotFound("Memos matching", _) => {
                "No memos found matching your search.".to_string()
            }
            CoreError::NotFound(what, _) => format!("{} not found", what),
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({ "error": message }));
        if matches!(self, CoreError::Unauthorized) {
            (status, [(header::WWW_AUTHENTICATE, "Basic")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
