//! Segment DTOs.

use serde::{Deserialize, Serialize};

/// Request body for `POST /segments`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSegmentRequest {
    /// Slug of the new segment.
    pub slug: String,
}

/// Response body for `POST /segments` (201 Created).
#[derive(Debug, Serialize)]
pub struct CreateSegmentResponse {
    /// Store-assigned segment id.
    pub id: i32,
    /// Slug echoed from the request.
    pub slug: String,
}

/// One segment in a user's membership list.
#[derive(Debug, Serialize)]
pub struct SegmentDto {
    /// Segment slug.
    pub slug: String,
}
