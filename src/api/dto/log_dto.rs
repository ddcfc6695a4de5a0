//! Audit log DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::LogEventType;
use crate::persistence::StoredLogEntry;

/// Query parameters for `GET /logs`. Both bounds are RFC 3339 instants;
/// the range is `[from, to)`.
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub to: DateTime<Utc>,
}

/// One audit log entry.
#[derive(Debug, Serialize)]
pub struct LogEntryDto {
    /// Affected user.
    pub user_id: i32,
    /// Affected segment slug.
    pub slug: String,
    /// `added`, `removed` or `expired`.
    pub event_type: LogEventType,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl From<StoredLogEntry> for LogEntryDto {
    fn from(entry: StoredLogEntry) -> Self {
        Self {
            user_id: entry.user_id.get(),
            slug: entry.slug,
            event_type: entry.event_type,
            created_at: entry.created_at,
        }
    }
}
