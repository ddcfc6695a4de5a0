//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::SegmentationService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Segmentation service for all engine operations.
    pub service: Arc<SegmentationService>,
}

impl AppState {
    /// Wraps a service into handler state.
    #[must_use]
    pub fn new(service: Arc<SegmentationService>) -> Self {
        Self { service }
    }
}
