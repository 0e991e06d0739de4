pub mod classify;
pub mod collector;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod handlers;
pub mod models;
pub mod oracle;
pub mod orchestrator;
pub mod positioning;
pub mod ranker;
pub mod scoring;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Analysis
        .route("/api/analyze", post(handlers::analyze_stream))
        .route("/api/analyze/run", post(handlers::analyze_run))
        // Oracle registry
        .route("/api/oracle/models", get(handlers::oracle_models))
        // Shared state
        .with_state(state)
}
