//! REST API over a finished run.
//!
//! Provides two GET endpoints:
//! - `/reports`: run summary and every model's final report
//! - `/trace`: exported-variable samples with optional time and model filtering

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::sim::engine::RunOutcome;
use crate::sim::types::SimulationMode;

pub use types::RunSummary;

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the simulation run completes and wrapped in
/// `Arc`; no locks needed since all data is read-only.
pub struct AppState {
    pub summary: RunSummary,
    pub outcome: RunOutcome,
}

impl AppState {
    pub fn new(
        mode: SimulationMode,
        architecture: impl Into<String>,
        duration_h: f64,
        outcome: RunOutcome,
    ) -> Self {
        Self {
            summary: RunSummary {
                mode: mode.to_string(),
                architecture: architecture.into(),
                duration_h,
                models: outcome.reports.len(),
                samples: outcome.trace.len(),
            },
            outcome,
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/reports", get(handlers::get_reports))
        .route("/trace", get(handlers::get_trace))
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server stops with an error.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
