// ABOUTME: Main entry point for the storefront backend: catalog, orders, payments, and identity webhooks
// ABOUTME: Parses configuration, builds shared dependencies, and serves the HTTP API

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod articles;
mod assets;
mod config;
mod entities;
mod error;
mod extract;
mod identity;
mod import;
mod middleware;
mod migration;
mod orders;
mod payments;
mod storage;
mod types;
mod webhooks;

#[cfg(test)]
mod integration_tests;

use assets::{AssetStore, UPLOADS_ROUTE};
use config::{Cli, Command, ServeConfig};
use identity::IdentityVerifier;
use payments::{PaymentProcessor, StripeClient};
use storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub assets: Arc<AssetStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub identity: Arc<dyn IdentityVerifier>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storefront=info,tower_http=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve(config) => serve(config).await,
        Command::ImportProducts(config) => import::run(config).await,
    }
}

async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    info!("Initializing storage...");
    let storage = Arc::new(Storage::connect(&config.database.database_url).await?);

    tokio::fs::create_dir_all(&config.uploads_dir).await?;
    let assets = Arc::new(AssetStore::new(
        config.assets_dir.clone(),
        config.uploads_dir.clone(),
        config.max_upload_bytes,
    ));

    let payments: Arc<dyn PaymentProcessor> = Arc::new(StripeClient::new(config.stripe())?);
    let identity: Arc<dyn IdentityVerifier> = Arc::new(config.identity_verifier()?);

    let app = app(AppState {
        storage,
        assets,
        payments,
        identity,
    });

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("🚀 Server listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest(
            "/articles",
            articles::router(state.assets.max_upload_bytes()),
        )
        .nest("/orders", orders::router())
        .nest("/webhooks", webhooks::router())
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.assets.uploads_dir()))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::resolve_identity,
        ))
        .layer(from_fn(middleware::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                tracing::error!("Failed to listen for Ctrl+C: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
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
}
