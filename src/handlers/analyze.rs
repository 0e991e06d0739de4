// ---------------------------------------------------------------------------
// handlers/analyze.rs — analysis endpoints (SSE stream + one-shot JSON)
// ---------------------------------------------------------------------------

use std::convert::Infallible;
use std::net::IpAddr;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::ApiError;
use crate::collector::FetchMode;
use crate::models::{AnalyzeRequest, ProgressEvent};
use crate::oracle::ModelId;
use crate::orchestrator::{run_analysis, AnalysisOptions};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Target validation
// ---------------------------------------------------------------------------

/// Normalize the user-supplied target: default the scheme to https, then
/// validate it is a public http(s) host. Private and loopback targets are
/// rejected — the analyzer fetches server-side.
pub(crate) fn normalize_target(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("A website URL is required".to_string());
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url =
        Url::parse(&with_scheme).map_err(|e| format!("Invalid URL '{}': {}", trimmed, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("Unsupported scheme '{}' — only http/https", other)),
    }

    let Some(host) = url.host_str() else {
        return Err("URL has no host".to_string());
    };
    let lower = host.to_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower == "169.254.169.254"
    {
        return Err(format!("Blocked host: {}", host));
    }
    if let Ok(ip) = lower.parse::<IpAddr>() {
        let is_private = match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_loopback(),
        };
        if is_private {
            return Err(format!("Blocked private/loopback IP: {}", ip));
        }
    }

    Ok(url)
}

// ---------------------------------------------------------------------------
// POST /api/analyze — SSE stream
// ---------------------------------------------------------------------------

pub async fn analyze_stream(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let target = normalize_target(&req.url).map_err(ApiError::BadRequest)?;

    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(32);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    tokio::spawn(run_analysis(
        state,
        target,
        tx,
        cancel,
        AnalysisOptions::default(),
    ));

    let stream = async_stream::stream! {
        // Dropping the guard (client disconnected) cancels the pipeline.
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            match serde_json::to_string(&event) {
                Ok(payload) => yield Ok::<_, Infallible>(Event::default().data(payload)),
                Err(e) => tracing::error!("analyze: failed to serialize event: {}", e),
            }
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

// ---------------------------------------------------------------------------
// POST /api/analyze/run — one-shot JSON
// ---------------------------------------------------------------------------

/// Runs the same pipeline as the stream (including the three independent
/// scoring calls) but drains events internally and returns only the final
/// payload. Uses polite fetch pacing since nobody is watching a spinner.
pub async fn analyze_run(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = normalize_target(&req.url).map_err(ApiError::BadRequest)?;

    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(32);
    let cancel = CancellationToken::new();
    let options = AnalysisOptions {
        fetch_mode: FetchMode::Polite,
        shuffle_seed: None,
    };
    tokio::spawn(run_analysis(state, target, tx, cancel, options));

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Complete { result } => {
                return serde_json::to_value(&*result)
                    .map(Json)
                    .map_err(|e| ApiError::Internal(e.to_string()));
            }
            ProgressEvent::Error { message } => {
                return Ok(Json(json!({ "error": message })));
            }
            _ => {}
        }
    }

    Err(ApiError::Internal(
        "analysis ended without a terminal event".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/oracle/models
// ---------------------------------------------------------------------------

pub async fn oracle_models(State(state): State<AppState>) -> Json<Value> {
    let health = state.oracle_health.read().await;
    Json(json!({
        "models": state.roster.iter().map(ModelId::to_string).collect::<Vec<_>>(),
        "lastKnownGood": health.last_good.as_ref().map(ModelId::to_string),
        "failed": health.failed.iter().map(ModelId::to_string).collect::<Vec<_>>(),
    }))
}
