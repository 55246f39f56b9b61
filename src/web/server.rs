//! HTTP server entry point.

use std::sync::Arc;

use tracing::info;

use super::handlers::AppState;
use super::router::create_router;
use crate::context::AppContext;
use crate::Result;

/// Bind and serve the HTTP API until interrupted.
pub async fn serve(ctx: AppContext) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    let router = create_router(Arc::new(AppState::new(ctx)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
