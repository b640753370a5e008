// =============================================================================
// CONTACT FORM SERVICE - Main Entry Point
// =============================================================================
// A single-page contact form backed by a relational store.
//
// WHAT THIS SERVICE DOES:
// - Serves the contact form at GET /
// - Validates submissions at POST / and stores them (one row each)
// - Shows a one-time confirmation or failure notice after the redirect
// - Exposes /health, /ready and Prometheus /metrics
//
// STARTUP ORDER:
// 1. .env + logging
// 2. configuration (database URL fallback chain)
// 3. metrics recorder
// 4. lazy database pool + one best-effort schema init
// 5. bind and serve
// =============================================================================

mod config;      // Configuration loading (config.rs)
mod db;          // Database operations (db.rs)
mod error;       // Error types (error.rs)
mod handlers;    // HTTP request handlers (handlers.rs)
mod metrics;     // Prometheus metrics setup (metrics.rs)
mod models;      // Data structures (models.rs)
mod session;     // Signed CSRF and flash cookies (session.rs)
mod validation;  // Contact form rules (validation.rs)
mod views;       // HTML rendering (views.rs)

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, DatabaseConfig};
use crate::db::Database;
use crate::metrics::setup_metrics;
use crate::session::CookieSigner;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared, read-only state available to every handler through
// State<Arc<AppState>>. The pool does its own synchronisation.
#[derive(Clone)]
pub struct AppState {
    /// Configuration resolved once at startup
    pub config: Config,

    /// Database connection pool
    pub db: Database,

    /// Signs and verifies the CSRF and flash cookies
    pub cookies: CookieSigner,

    /// Prometheus metrics handle
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Contact form -----
        // Same address for reading and writing
        .route("/", get(handlers::show_form).post(handlers::submit_form))
        // ----- Health & Readiness Endpoints -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // ----- Metrics Endpoint -----
        .route("/metrics", get(handlers::metrics_handler))
        // Trace layer: Log every request
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -----------------------------------------------------------------------------
// MAIN FUNCTION
// -----------------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Environment and logging
    // -------------------------------------------------------------------------
    // .ok() ignores a missing .env file
    dotenvy::dotenv().ok();

    // RUST_LOG controls log levels, e.g. RUST_LOG=info,contact_form_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,contact_form_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Contact Form Service...");

    // -------------------------------------------------------------------------
    // STEP 2: Load configuration
    // -------------------------------------------------------------------------
    // Never fails: every setting has a logged fallback
    let config = Config::from_env();
    info!(
        port = config.port,
        database_source = config.database.source.as_str(),
        csrf_enabled = config.csrf_enabled,
        "Configuration loaded"
    );

    // -------------------------------------------------------------------------
    // STEP 3: Set up Prometheus metrics
    // -------------------------------------------------------------------------
    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 4: Database pool and schema
    // -------------------------------------------------------------------------
    let db = open_database(&config.database)?;
    initialize_schema(&db).await;

    // -------------------------------------------------------------------------
    // STEP 5: Create application state and routes
    // -------------------------------------------------------------------------
    let state = Arc::new(AppState {
        cookies: CookieSigner::new(&config.secret_key),
        db: db.clone(),
        metrics_handle,
        config,
    });

    let addr = state.config.bind_address();
    let app = build_router(state);

    // -------------------------------------------------------------------------
    // STEP 6: Start the HTTP server
    // -------------------------------------------------------------------------
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Contact Form Service is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Contact Form Service stopped");

    Ok(())
}

/// Build the pool, falling back to the embedded store if the resolved URL
/// cannot be used by any driver.
fn open_database(config: &DatabaseConfig) -> anyhow::Result<Database> {
    match Database::connect_lazy(config) {
        Ok(db) => Ok(db),
        Err(e) => {
            warn!(error = %e, "Database URL rejected by driver, using embedded store");
            Ok(Database::connect_lazy(&DatabaseConfig {
                max_connections: config.max_connections,
                acquire_timeout: config.acquire_timeout,
                ..DatabaseConfig::embedded()
            })?)
        }
    }
}

/// The one initialization phase, run before the listener is bound.
///
/// Failures are logged and startup continues; a later write against a
/// missing table takes the handler's failure path.
async fn initialize_schema(db: &Database) {
    match db.init_schema().await {
        Ok(()) => match db.count_messages().await {
            Ok(count) => info!(
                backend = ?db.backend(),
                stored_messages = count,
                "Database schema ready"
            ),
            Err(e) => warn!(error = %e, "Schema created but message count failed"),
        },
        Err(e) => error!(
            error = %e,
            backend = ?db.backend(),
            "Could not create the message table; continuing without it"
        ),
    }
}

/// Resolves on Ctrl+C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
