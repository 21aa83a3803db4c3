//! Job CRUD endpoints under `/api/jobs`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use traitor_scheduler::{
    schedule::next_exec_time, ExecType, Job, JobDraft, JobPatch, JobState, SchedulerError,
};

use crate::app::AppState;
use crate::http::error::ApiError;

/// A job plus its derived next fire time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub next_exec_time: Option<DateTime<Utc>>,
}

impl JobView {
    fn new(state: &AppState, job: Job) -> Self {
        let next_exec_time = next_exec_time(&job, Utc::now(), state.scheduler.offset());
        Self {
            job,
            next_exec_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StateBody {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScriptBody {
    pub script: String,
}

/// GET /api/jobs
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.store.list()?;
    Ok(Json(
        jobs.into_iter().map(|j| JobView::new(&state, j)).collect(),
    ))
}

/// POST /api/jobs. New jobs start disabled unless the body says otherwise.
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(draft) = payload?;
    insert(&state, draft)
}

/// POST /api/jobs/run: create a job that is enabled immediately.
pub async fn create_and_run(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(draft) = payload?;
    insert(&state, draft.enabled())
}

/// GET /api/jobs/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.store.get(&id)?;
    Ok(Json(JobView::new(&state, job)))
}

/// PUT /api/jobs/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<JobPatch>, JsonRejection>,
) -> Result<Json<JobView>, ApiError> {
    let Json(patch) = payload?;
    let moves_exec_at = patch.exec_at.is_some();
    let job = state.store.update(&id, patch, |job| {
        if moves_exec_at {
            check_exec_at(&state, job.exec_type, job.exec_at)?;
        }
        Ok(())
    })?;
    Ok(Json(JobView::new(&state, job)))
}

/// DELETE /api/jobs/{id}. Also cancels the job's in-flight runs.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/jobs/{id}/state
pub async fn set_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StateBody>, JsonRejection>,
) -> Result<Json<JobView>, ApiError> {
    let Json(body) = payload?;
    let target = if body.enabled {
        JobState::Enabled
    } else {
        JobState::Disabled
    };
    let job = state.store.set_state(&id, target)?;
    Ok(Json(JobView::new(&state, job)))
}

/// GET /api/jobs/{id}/script
pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScriptBody>, ApiError> {
    let script = state.store.script(&id)?;
    Ok(Json(ScriptBody { script }))
}

/// PUT /api/jobs/{id}/script
pub async fn put_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ScriptBody>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = payload?;
    state.store.update_script(&id, &body.script)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn insert(state: &AppState, draft: JobDraft) -> Result<(StatusCode, Json<JobView>), ApiError> {
    check_exec_at(state, draft.exec_type, draft.exec_at)?;
    let job = state.store.create(draft)?;
    Ok((StatusCode::CREATED, Json(JobView::new(state, job))))
}

/// Delay jobs written through the API must fire at least
/// `jobs.min_delay_secs` from now.
fn check_exec_at(
    state: &AppState,
    exec_type: ExecType,
    exec_at: Option<DateTime<Utc>>,
) -> Result<(), SchedulerError> {
    let (ExecType::Delay, Some(at)) = (exec_type, exec_at) else {
        return Ok(());
    };
    let min = state.config.jobs.min_delay_secs;
    if at < Utc::now() + Duration::seconds(min) {
        return Err(SchedulerError::Validation(format!(
            "execAt must be at least {min}s in the future"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{call, test_state};
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn timing_body(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "execType": "timing",
            "cron": "0 */5 * * * *",
            "script": "echo hi"
        })
    }

    #[tokio::test]
    async fn create_list_get() {
        let state = test_state();
        let (status, created) = call(&state, "POST", "/api/jobs", Some(timing_body("a"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"], "disabled");
        assert_eq!(created["execType"], "timing");
        assert!(created["nextExecTime"].is_string());

        let id = created["id"].as_str().unwrap().to_string();
        let (status, list) = call(&state, "GET", "/api/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, one) = call(&state, "GET", &format!("/api/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["name"], "a");
    }

    #[tokio::test]
    async fn run_endpoint_creates_enabled_job() {
        let state = test_state();
        let (status, created) =
            call(&state, "POST", "/api/jobs/run", Some(timing_body("now"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"], "enabled");
    }

    #[tokio::test]
    async fn invalid_cron_rejected_and_not_stored() {
        let state = test_state();
        let mut body = timing_body("bad");
        body["cron"] = json!("*/5 * * * *");
        let (status, err) = call(&state, "POST", "/api/jobs", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "INVALID_CRON");

        let (_, list) = call(&state, "GET", "/api/jobs", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delay_too_soon_is_invalid_job() {
        let state = test_state();
        let body = json!({
            "name": "soon",
            "execType": "delay",
            "execAt": (Utc::now() + Duration::seconds(1)).to_rfc3339(),
        });
        let (status, err) = call(&state, "POST", "/api/jobs", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "INVALID_JOB");

        let ok = json!({
            "name": "later",
            "execType": "delay",
            "execAt": (Utc::now() + Duration::minutes(10)).to_rfc3339(),
        });
        let (status, _) = call(&state, "POST", "/api/jobs", Some(ok)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn moving_delay_too_soon_is_rejected_and_not_stored() {
        let state = test_state();
        let later = (Utc::now() + Duration::minutes(10)).to_rfc3339();
        let body = json!({ "name": "d", "execType": "delay", "execAt": later });
        let (_, created) = call(&state, "POST", "/api/jobs", Some(body)).await;
        let id = created["id"].as_str().unwrap().to_string();

        let soon = (Utc::now() + Duration::seconds(1)).to_rfc3339();
        let (status, err) = call(
            &state,
            "PUT",
            &format!("/api/jobs/{id}"),
            Some(json!({ "execAt": soon, "name": "moved" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "INVALID_JOB");

        let (_, stored) = call(&state, "GET", &format!("/api/jobs/{id}"), None).await;
        assert_eq!(stored["name"], "d");
        assert_eq!(stored["execAt"], created["execAt"]);

        // Renaming alone does not re-check an execAt that is already set.
        let (status, renamed) = call(
            &state,
            "PUT",
            &format!("/api/jobs/{id}"),
            Some(json!({ "name": "renamed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "renamed");
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_job() {
        let state = test_state();
        let (status, err) = call(&state, "POST", "/api/jobs", Some(json!({ "name": 3 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "INVALID_JOB");
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let state = test_state();
        for (method, uri) in [
            ("GET", "/api/jobs/nope"),
            ("DELETE", "/api/jobs/nope"),
            ("GET", "/api/jobs/nope/script"),
        ] {
            let (status, err) = call(&state, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(err["error"]["code"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn update_state_script_and_delete() {
        let state = test_state();
        let (_, created) = call(&state, "POST", "/api/jobs", Some(timing_body("a"))).await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, updated) = call(
            &state,
            "PUT",
            &format!("/api/jobs/{id}"),
            Some(json!({ "name": "renamed", "state": "enabled" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "renamed");
        assert_eq!(updated["state"], "disabled");

        let (status, enabled) = call(
            &state,
            "POST",
            &format!("/api/jobs/{id}/state"),
            Some(json!({ "enabled": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(enabled["state"], "enabled");

        let (status, _) = call(
            &state,
            "PUT",
            &format!("/api/jobs/{id}/script"),
            Some(json!({ "script": "echo changed" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, script) = call(&state, "GET", &format!("/api/jobs/{id}/script"), None).await;
        assert_eq!(script["script"], "echo changed");

        let (status, _) = call(&state, "DELETE", &format!("/api/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&state, "GET", &format!("/api/jobs/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
