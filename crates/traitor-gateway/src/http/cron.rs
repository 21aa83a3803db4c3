use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use traitor_scheduler::next_matches;

use crate::app::AppState;
use crate::http::error::ApiError;

const DEFAULT_COUNT: usize = 5;
const MAX_COUNT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub cron: String,
    /// RFC 3339 reference instant; defaults to now.
    pub from: Option<String>,
    /// Defaults to `scheduler.utc_offset_minutes`.
    pub offset_minutes: Option<i32>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub matches: Vec<DateTime<FixedOffset>>,
}

/// GET /api/cron/preview — next fire times of an expression.
///
/// An expression that never fires again answers with an empty list; an
/// unparseable one is `INVALID_CRON`.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PreviewQuery>, QueryRejection>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let Query(q) = query?;

    let offset = match q.offset_minutes {
        Some(minutes) => FixedOffset::east_opt(minutes.saturating_mul(60)).ok_or_else(|| {
            ApiError::InvalidJob(format!("offsetMinutes out of range: {minutes}"))
        })?,
        None => state.scheduler.offset(),
    };

    let from = match q.from.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| ApiError::InvalidJob(format!("invalid from '{raw}': {e}")))?
            .with_timezone(&offset),
        None => Utc::now().with_timezone(&offset),
    };

    let count = q.count.unwrap_or(DEFAULT_COUNT).min(MAX_COUNT);
    let matches =
        next_matches(&q.cron, from, count).map_err(|e| ApiError::InvalidCron(e.to_string()))?;
    Ok(Json(PreviewResponse { matches }))
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{call, test_state};
    use axum::http::StatusCode;
    use chrono::{DateTime, Utc};

    fn instants(body: &serde_json::Value) -> Vec<DateTime<Utc>> {
        body["matches"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| {
                DateTime::parse_from_rfc3339(v.as_str().unwrap())
                    .unwrap()
                    .with_timezone(&Utc)
            })
            .collect()
    }

    #[tokio::test]
    async fn every_five_minutes() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "GET",
            "/api/cron/preview?cron=0%20*/5%20*%20*%20*%20*&from=2024-01-01T00:00:00Z&count=3",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let expected: Vec<DateTime<Utc>> = [
            "2024-01-01T00:05:00Z",
            "2024-01-01T00:10:00Z",
            "2024-01-01T00:15:00Z",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        assert_eq!(instants(&body), expected);
    }

    #[tokio::test]
    async fn defaults_to_five_matches() {
        let state = test_state();
        let (status, body) =
            call(&state, "GET", "/api/cron/preview?cron=0%200%20*%20*%20*%20*", None).await;
        assert_eq!(status, StatusCode::OK);
        let got = instants(&body);
        assert_eq!(got.len(), 5);
        assert!(got[0] > Utc::now());
    }

    #[tokio::test]
    async fn impossible_date_is_empty_not_error() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "GET",
            "/api/cron/preview?cron=0%200%200%2030%202%20*&from=2024-01-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["matches"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_expression_is_invalid_cron() {
        let state = test_state();
        let (status, body) =
            call(&state, "GET", "/api/cron/preview?cron=not%20a%20cron", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_CRON");
    }

    #[tokio::test]
    async fn bad_from_is_rejected() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "GET",
            "/api/cron/preview?cron=0%20*%20*%20*%20*%20*&from=yesterday",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_JOB");
    }
}
