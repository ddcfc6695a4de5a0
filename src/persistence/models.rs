//! Database models for the audit log.

use chrono::{DateTime, Utc};
use crate::domain::{LogEventType, UserId};

/// A stored row from the `user_segment_logs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLogEntry {
    /// Auto-increment row ID.
    pub id: i64,
    /// Affected user.
    pub user_id: UserId,
    /// Affected segment slug.
    pub slug: String,
    /// Kind of change.
    pub event_type: LogEventType,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}
