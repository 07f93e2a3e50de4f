//! JSON API handlers.

use super::AppState;
use crate::availability::{
    summarize, AvailabilityChartData, AvailabilityCheck, AvailabilitySettings,
    DeviceAvailabilityResult, DeviceAvailabilityStats, DeviceCheckOutcome, LatencySummary,
    Overview, RunChecksResponse,
};
use crate::client::ClientError;
use crate::condition::{Condition, ConditionError};
use crate::db::{deserialize_tdigest, merge_stored_digests, CheckRun, DbError};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Backend(#[from] ClientError),
    #[error("invalid condition: {0}")]
    Condition(#[from] ConditionError),
    #[error("storage error: {0}")]
    Store(#[from] DbError),
    #[error("{0}")]
    BadRequest(String),
    #[error("device check refused: {0}")]
    CheckRefused(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Backend(ClientError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
            ApiError::Condition(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::CheckRefused(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("API error: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Apply an optional `where` condition to rows.
pub fn apply_filter<T: Serialize>(rows: Vec<T>, filter: Option<&str>) -> Result<Vec<T>, ConditionError> {
    match filter.map(str::trim) {
        None | Some("") => Ok(rows),
        Some(src) => Ok(Condition::parse(src)?.filter(rows)),
    }
}

// ============================================================================
// API: Availability
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(default, rename = "where")]
    pub filter: Option<String>,
}

pub async fn handle_get_availability(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<DeviceAvailabilityResult>>, ApiError> {
    let merged = state.view.read().await.merged();
    Ok(Json(apply_filter(merged, query.filter.as_deref())?))
}

pub async fn handle_get_stats(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<DeviceAvailabilityStats>, ApiError> {
    let merged = state.view.read().await.merged();
    let rows = apply_filter(merged, query.filter.as_deref())?;
    Ok(Json(summarize(Some(&rows))))
}

pub async fn handle_get_overview(State(state): State<AppState>) -> Json<Overview> {
    Json(state.view.read().await.overview())
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(default, rename = "maxConcurrent")]
    pub max_concurrent: Option<u32>,
}

pub async fn handle_run_checks(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<RunChecksResponse>, ApiError> {
    let max_concurrent = query.max_concurrent.unwrap_or(state.config.max_concurrent);
    if max_concurrent == 0 {
        return Err(ApiError::BadRequest("maxConcurrent must be at least 1".to_string()));
    }

    Ok(Json(state.poller.trigger_check(max_concurrent).await?))
}

// ============================================================================
// API: History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub hours: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: DeviceAvailabilityStats,
    pub latency: Option<LatencySummary>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub samples: Vec<HistoryPoint>,
    /// Response time distribution over the whole window
    pub latency: Option<LatencySummary>,
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let hours = query.hours.unwrap_or(24).clamp(1, 24 * 365);
    let limit = query.limit.unwrap_or(1000).min(10_000);
    let end = Utc::now();
    let start = end - ChronoDuration::hours(hours);

    let samples = state.store.get_samples(start, end, limit)?;

    let latency = merge_stored_digests(samples.iter().map(|s| s.latency_digest.as_slice()))
        .map(|td| LatencySummary::from_digest(&td));

    let samples = samples
        .into_iter()
        .map(|s| HistoryPoint {
            time: s.time,
            stats: s.stats,
            latency: deserialize_tdigest(&s.latency_digest).map(|td| LatencySummary::from_digest(&td)),
        })
        .collect();

    Ok(Json(HistoryResponse {
        start,
        end,
        samples,
        latency,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn handle_get_runs(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CheckRun>>, ApiError> {
    let limit = query.limit.unwrap_or(20).min(500);
    Ok(Json(state.store.get_check_runs(limit)?))
}

// ============================================================================
// API: Backend passthrough
// ============================================================================

pub async fn handle_check_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeviceAvailabilityResult>, ApiError> {
    match state.client.check_device(id).await? {
        DeviceCheckOutcome::Checked(result) => {
            tracing::info!(
                "Device {} checked: {}",
                id,
                if result.is_available { "available" } else { "unavailable" }
            );
            Ok(Json(result))
        }
        DeviceCheckOutcome::Rejected { error } => Err(ApiError::CheckRefused(error)),
    }
}

pub async fn handle_device_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AvailabilityCheck>>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.client.device_history(id, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

pub async fn handle_device_chart(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<AvailabilityChartData>, ApiError> {
    let days = query.days.unwrap_or(7).clamp(1, 365);
    Ok(Json(state.client.chart_data(id, days).await?))
}

pub async fn handle_get_settings(
    State(state): State<AppState>,
) -> Result<Json<AvailabilitySettings>, ApiError> {
    Ok(Json(state.client.settings().await?))
}

pub async fn handle_update_settings(
    State(state): State<AppState>,
    Json(settings): Json<AvailabilitySettings>,
) -> Result<Json<AvailabilitySettings>, ApiError> {
    if settings.check_interval_minutes == 0 {
        return Err(ApiError::BadRequest(
            "check_interval_minutes must be at least 1".to_string(),
        ));
    }
    Ok(Json(state.client.update_settings(&settings).await?))
}
