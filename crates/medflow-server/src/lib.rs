//! MedFlow Server - Medicine Assistant Workflow Backend
//!
//! A standalone Rust backend server for the MedFlow workflows, providing:
//! - RESTful HTTP API via axum
//! - SSE streaming of incremental workflow output
//! - Suspend / resume of human-in-the-loop runs
//!
//! This crate can be used standalone or embedded in other applications
//! (e.g., the `medflow` CLI).

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use medflow_core::state::{AppState, AppStateInner};
use medflow_core::MedflowConfig;

/// Configuration for the MedFlow backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional path to static frontend files.
    /// When set, the server serves these files for all non-API routes.
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4111,
            static_dir: None,
        }
    }
}

/// Create a shared `AppState` from the process environment.
pub fn create_app_state() -> Result<AppState, String> {
    let config = MedflowConfig::from_env()?;
    let inner = AppStateInner::new(config).map_err(|e| format!("Failed to build workflows: {}", e))?;
    Ok(Arc::new(inner))
}

/// Initialise the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medflow_server=info,medflow_core=info,tower_http=info".into()),
        )
        .try_init();
}

/// Start the MedFlow backend server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "Starting MedFlow backend server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state()?;

    start_server_with_state(config, state).await
}

/// Build the full router: API, health check, CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.host:config.port` and serve `state` in the background.
/// Returns the bound address, which differs from the config when port 0 is used.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = match config.static_dir.as_deref() {
        Some(dir) => with_frontend(app(state), dir),
        None => app(state),
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("MedFlow backend server listening on {}", local_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// Serve a built frontend for every path the API doesn't claim, falling back
/// to `index.html` for client-side routes.
fn with_frontend(app: Router, dir: &str) -> Router {
    let root = std::path::Path::new(dir);
    if !root.is_dir() {
        tracing::warn!("Frontend directory {} is missing; serving the API only", dir);
        return app;
    }
    tracing::info!("Serving frontend from {}", dir);
    let index = tower_http::services::ServeFile::new(root.join("index.html"));
    app.fallback_service(tower_http::services::ServeDir::new(root).not_found_service(index))
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "medflow-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
