//! Liveness endpoint for the hosting platform's health checks.

use axum::{routing::get, Router};

pub const ALIVE: &str = "Bot is running.";

pub fn router() -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(alive))
}

async fn alive() -> &'static str {
    ALIVE
}

pub async fn serve(port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "health endpoint listening");
    axum::serve(listener, router()).await
}
