//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::AppState;
use super::types::{ErrorResponse, ReportsResponse, TraceQuery};
use crate::sim::variable::TraceRecord;

/// Returns the run summary and every final report.
///
/// `GET /reports` → 200 + `ReportsResponse` JSON
pub async fn get_reports(State(state): State<Arc<AppState>>) -> Response {
    Json(ReportsResponse {
        summary: &state.summary,
        reports: &state.outcome.reports,
    })
    .into_response()
}

/// Returns trace samples, optionally filtered.
///
/// `GET /trace` → 200 + `Vec<TraceRecord>` JSON
/// `GET /trace?from=0.1&to=0.2&model=heater-temperature` → filtered (inclusive)
/// `GET /trace?from=0.5&to=0.1` → 400 + `ErrorResponse`
pub async fn get_trace(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TraceQuery>,
) -> Response {
    let from = query.from.unwrap_or(f64::NEG_INFINITY);
    let to = query.to.unwrap_or(f64::INFINITY);

    if from > to {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        )
            .into_response();
    }

    let records: Vec<&TraceRecord> = state
        .outcome
        .trace
        .iter()
        .filter(|r| r.time_h >= from && r.time_h <= to)
        .filter(|r| query.model.as_deref().is_none_or(|m| r.model == m))
        .filter(|r| query.variable.as_deref().is_none_or(|v| r.variable == v))
        .collect();

    Json(records).into_response()
}
