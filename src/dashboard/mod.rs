//! Dashboard: Axum web server for scans, quotes and plan info.
//!
//! Serves a REST API and a self-contained HTML page.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    response::Html,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Bind the port and serve in a background task.
///
/// Binding happens before returning so a taken port is reported to the
/// caller instead of dying inside the task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;

    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // API routes
        .route("/api/scan", get(routes::run_scan))
        .route("/api/scan/latest", get(routes::latest_scan))
        .route("/api/quote/:ticker", get(routes::get_quote))
        .route("/api/plans", get(routes::get_plans))
        .route("/api/account", get(routes::get_account))
        .route("/api/allocation", get(routes::get_allocation))
        .route("/api/trades", get(routes::get_trades).post(routes::record_trade))
        .route("/health", get(routes::health))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
