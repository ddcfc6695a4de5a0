//! User membership handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};

use super::detached;
use crate::api::dto::{ModifyUserRequest, SegmentDto};
use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::SegmentationError;

/// `PATCH /users`: Append and remove memberships for one user.
///
/// # Errors
///
/// 400 on an invalid slug. 500 with one line per failed change when some
/// changes failed; the others are committed regardless.
pub async fn modify_user(
    State(state): State<AppState>,
    Json(req): Json<ModifyUserRequest>,
) -> Result<StatusCode, SegmentationError> {
    let (user_id, appends, removes) = req.into_parts()?;
    let service = Arc::clone(&state.service);
    detached(async move { service.modify_user(user_id, appends, removes).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /users/{id}`: Current, non-expired memberships of a user.
///
/// # Errors
///
/// 500 on store failure.
pub async fn get_user_segments(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<SegmentDto>>, SegmentationError> {
    let slugs = state.service.get_user_relations(UserId::new(id)).await?;
    Ok(Json(
        slugs.into_iter().map(|slug| SegmentDto { slug }).collect(),
    ))
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", patch(modify_user))
        .route("/users/{id}", get(get_user_segments))
}
