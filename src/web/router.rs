//! Router configuration for the HTTP API.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{admin, files, AppState};

/// Create the main API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/upload/chunk", post(files::upload_chunk))
        .route("/upload", post(files::upload))
        .route("/items", get(files::list_items))
        .route("/items/:id", delete(files::delete_item))
        .route("/items/:id/rename", put(files::rename_item))
        .route("/directories", post(files::create_directory))
        .route("/download/:id", get(files::download))
        .route("/config", get(files::get_config));

    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/logs", get(admin::logs))
        .route("/logs/purge", post(admin::purge_logs))
        .route(
            "/settings",
            get(admin::get_settings).put(admin::put_setting),
        )
        .route("/purge", post(admin::purge));

    // Room for one chunk plus multipart framing
    let body_limit = state.ctx.config.max_upload_size_bytes() as usize + 1024 * 1024;

    let mut router = Router::new()
        .nest("/api", api_routes)
        .nest("/admin", admin_routes)
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&state.ctx.config.server.cors_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        );

    if state.ctx.config.server.serve_static {
        router = router.fallback_service(ServeDir::new(&state.ctx.config.server.static_path));
    }

    router.with_state(state)
}

/// Create a CORS layer from configuration.
///
/// With no configured origins (dev mode) any origin is allowed without
/// credentials; with explicit origins the header list is pinned.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let parsed_origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    if parsed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([
                CONTENT_TYPE,
                ACCEPT,
                HeaderName::from_static(admin::ADMIN_PASSWORD_HEADER),
            ])
            .allow_credentials(true)
            .allow_origin(parsed_origins)
    }
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
