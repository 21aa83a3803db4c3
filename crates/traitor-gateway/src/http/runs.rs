use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use traitor_scheduler::RunInfo;

use crate::app::AppState;

#[derive(Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RunInfo>,
}

/// GET /api/runs — in-flight scheduler runs and debug sessions.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<RunsResponse> {
    let mut runs = state.scheduler.active_runs();
    runs.extend(state.debug.active_sessions());
    runs.sort_by_key(|r| r.started_at);
    Json(RunsResponse { runs })
}
