//! Segment handlers: create and delete.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};

use super::detached;
use crate::api::dto::{CreateSegmentRequest, CreateSegmentResponse};
use crate::app_state::AppState;
use crate::domain::Slug;
use crate::error::SegmentationError;

/// `POST /segments`: Create a segment.
///
/// # Errors
///
/// 400 on an invalid slug, 500 if the slug already exists or the store
/// fails.
pub async fn create_segment(
    State(state): State<AppState>,
    Json(req): Json<CreateSegmentRequest>,
) -> Result<impl IntoResponse, SegmentationError> {
    let slug = Slug::parse(req.slug)?;
    let service = Arc::clone(&state.service);
    let created = slug.clone();
    let id = detached(async move { service.add_segment(&created).await }).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSegmentResponse {
            id,
            slug: slug.to_string(),
        }),
    ))
}

/// `DELETE /segments/{slug}`: Delete a segment and all its memberships.
/// Unknown slugs succeed.
///
/// # Errors
///
/// 400 on an invalid slug, 500 on store failure.
pub async fn delete_segment(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, SegmentationError> {
    let slug = Slug::parse(slug)?;
    let service = Arc::clone(&state.service);
    detached(async move { service.delete_segment(&slug).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Segment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/segments", post(create_segment))
        .route("/segments/{slug}", delete(delete_segment))
}
