mod auth;
mod error;
mod handlers;

use crate::{config::Config, media::MediaResolver};
use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<MediaResolver>,
    pub secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(resolver: MediaResolver, secret: Option<String>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            secret: secret.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/fetch", get(handlers::fetch).post(handlers::fetch))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_secret,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .merge(api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    crate::media::test_setup(&config).await;

    let resolver =
        MediaResolver::from_config(&config).context("Failed to initialize media resolver")?;
    let state = AppState::new(resolver, config.auth.secret.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Server running on {}", addr);
    match config.cobalt.self_hosted_url.as_deref() {
        Some(url) => info!("Cobalt URL: {}", url),
        None => info!("Cobalt URL: using public instances"),
    }
    if state.secret.is_none() {
        info!("No API secret configured, /fetch is open");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
