//! REST endpoint handlers organized by resource.

pub mod log;
pub mod segment;
pub mod system;
pub mod user;

use std::future::Future;

use axum::Router;

use crate::app_state::AppState;
use crate::error::SegmentationError;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(segment::routes())
        .merge(user::routes())
        .merge(log::routes())
}

/// Runs a mutating engine call on its own task and waits for it.
///
/// A request future is dropped on timeout or client disconnect; the
/// spawned task is not, so a transaction that has begun always reaches
/// commit or rollback.
///
/// # Errors
///
/// The call's own error, or [`SegmentationError::Internal`] if the task
/// panicked.
pub async fn detached<F, T>(call: F) -> Result<T, SegmentationError>
where
    F: Future<Output = Result<T, SegmentationError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(call)
        .await
        .map_err(|e| SegmentationError::Internal(format!("engine task failed: {e}")))?
}
