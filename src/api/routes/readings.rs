//! Reading Routes
//!
//! - POST /api/v1/readings - Store and broadcast a reading
//! - GET /api/v1/readings - History within a time range
//! - GET /api/v1/readings/latest - Most recent reading
//! - GET /api/v1/readings/summary - Aggregate statistics

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::api::dto::{HistoryParams, ReadingListResponse, SummaryResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::reading::{Reading, StoredReading};
use crate::storage::TimeRange;

/// Window used when no start is given
const DEFAULT_WINDOW_HOURS: i64 = 24;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// POST /api/v1/readings
///
/// The body is a reading in persisted field naming. Responds 201 with the
/// stored reading.
pub async fn create_reading(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StoredReading>)> {
    let reading = Reading::from_json(&body)?;
    let stored = state.pipeline.ingest(reading).await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/v1/readings
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<ReadingListResponse>> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let (start, end) = resolve_window(&params);
    let range = TimeRange::between(start, end)?;
    let limit = resolve_limit(params.limit)?;

    let readings = state.store.list(range, limit).await?;

    Ok(Json(ReadingListResponse {
        count: readings.len(),
        readings,
        start,
        end,
    }))
}

/// GET /api/v1/readings/latest
pub async fn latest_reading(State(state): State<Arc<AppState>>) -> ApiResult<Json<StoredReading>> {
    state
        .store
        .latest()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no readings stored yet".to_string()))
}

/// GET /api/v1/readings/summary
pub async fn reading_summary(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<SummaryResponse>> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let (start, end) = resolve_window(&params);
    let range = TimeRange::between(start, end)?;

    let summary = state.store.summary(range).await?;

    Ok(Json(SummaryResponse {
        start,
        end,
        summary,
    }))
}

fn resolve_window(params: &HistoryParams) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = params.end.unwrap_or_else(Utc::now);
    let start = params
        .start
        .unwrap_or_else(|| end - Duration::hours(DEFAULT_WINDOW_HOURS));
    (start, end)
}

fn resolve_limit(limit: Option<usize>) -> ApiResult<usize> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(0) => Err(ApiError::Validation("limit must be at least 1".to_string())),
        Some(n) => Ok(n.min(MAX_LIMIT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_one_day() {
        let (start, end) = resolve_window(&HistoryParams::default());
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn test_window_from_end_only() {
        let end = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (start, resolved_end) = resolve_window(&HistoryParams {
            end: Some(end),
            ..Default::default()
        });

        assert_eq!(resolved_end, end);
        assert_eq!(start, end - Duration::hours(24));
    }

    #[test]
    fn test_limit_bounds() {
        assert_eq!(resolve_limit(None).unwrap(), DEFAULT_LIMIT);
        assert_eq!(resolve_limit(Some(5)).unwrap(), 5);
        assert_eq!(resolve_limit(Some(50_000)).unwrap(), MAX_LIMIT);
        assert!(resolve_limit(Some(0)).is_err());
    }
}
