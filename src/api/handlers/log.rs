//! Audit log handler.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{LogEntryDto, LogQuery};
use crate::app_state::AppState;
use crate::error::SegmentationError;

/// `GET /logs?from=..&to=..`: Audit log entries written in `[from, to)`.
///
/// # Errors
///
/// 400 if `from` is not before `to`, 500 on store failure.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntryDto>>, SegmentationError> {
    let entries = state.service.get_logs(query.from, query.to).await?;
    Ok(Json(entries.into_iter().map(LogEntryDto::from).collect()))
}

/// Log routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/logs", get(get_logs))
}
