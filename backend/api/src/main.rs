//! Rewards API: entry point.
//!
//! Serves the points ledger over a small Axum REST API backed by SQLite, and
//! runs a background sweep that settles referral payouts left behind by a
//! failed write.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use rewards_ledger::Ledger;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use auth::{BcryptHasher, TokenKeys};
use config::Config;
use db::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let ledger = Ledger::new(
        SqliteStore::new(pool),
        config.clock()?,
        BcryptHasher::new(config.bcrypt_cost),
    );
    let state = Arc::new(api::ApiState {
        ledger,
        tokens: TokenKeys::new(&config.jwt_secret, config.token_ttl_days),
    });

    // ─── Background referral sweep ────────────────────────
    let shutdown = CancellationToken::new();
    let sweep = tokio::spawn(sweeper::run(
        Arc::clone(&state),
        Duration::from_secs(config.reconcile_interval_secs),
        shutdown.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login))
        .route("/api/user/profile", get(api::profile))
        .route("/api/user/refill", post(api::refill))
        .route("/api/tasks/complete", post(api::complete_task))
        .route("/api/withdraw", post(api::withdraw))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweep.await {
        warn!("Referral sweep task ended abnormally: {e}");
    }
    Ok(())
}

/// Resolves on Ctrl-C, cancelling background work.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        shutdown.cancelled().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
