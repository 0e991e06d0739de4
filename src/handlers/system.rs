// ---------------------------------------------------------------------------
// handlers/system.rs — health & readiness
// ---------------------------------------------------------------------------

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::models::HealthResponse;
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: "ShopLens".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        providers: state.providers.clone(),
    })
}

/// GET /api/health/ready — ready as soon as the router is up; there is no
/// startup sync to wait for.
pub async fn readiness(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ready": true,
        "oracle_models": state.roster.len(),
    }))
}
