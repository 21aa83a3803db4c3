use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness check, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "gitSha": env!("TRAITOR_GIT_SHA"),
        "schedulerRuns": state.scheduler.active_runs().len(),
        "debugSessions": state.debug.active_sessions().len(),
    }))
}
