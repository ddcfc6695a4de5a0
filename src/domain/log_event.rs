//! Audit log events for membership changes.
//!
//! Events are appended after the mutating transaction has committed and are
//! written best-effort: losing one never affects membership state.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{BatchReport, MembershipChange, RemovedMembership, UserId};

/// What happened to a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventType {
    /// The user was added to the segment.
    Added,
    /// The user was removed, explicitly or by segment deletion.
    Removed,
    /// The membership expired and was swept.
    Expired,
}

impl LogEventType {
    /// Column value stored in `user_segment_logs.event_type`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for LogEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "removed" => Ok(Self::Removed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown log event type: {other}")),
        }
    }
}

/// A log entry waiting to be written. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Affected user.
    pub user_id: UserId,
    /// Affected segment.
    pub slug: String,
    /// Kind of change.
    pub event_type: LogEventType,
}

impl LogEvent {
    /// Builds one event per applied unit of a batch.
    #[must_use]
    pub fn from_batch(report: &BatchReport) -> Vec<Self> {
        report
            .applied()
            .iter()
            .map(|change| Self {
                user_id: report.user_id(),
                slug: change.slug().to_string(),
                event_type: match change {
                    MembershipChange::Append { .. } => LogEventType::Added,
                    MembershipChange::Remove { .. } => LogEventType::Removed,
                },
            })
            .collect()
    }

    /// Builds events for memberships dropped by a deletion or a sweep.
    /// Memberships whose segment no longer resolves are skipped.
    #[must_use]
    pub fn from_removed(removed: &[RemovedMembership], event_type: LogEventType) -> Vec<Self> {
        removed
            .iter()
            .filter_map(|m| {
                m.slug.as_ref().map(|slug| Self {
                    user_id: m.user_id,
                    slug: slug.clone(),
                    event_type,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Slug;

    #[test]
    fn event_type_round_trips_through_column_text() {
        for ty in [
            LogEventType::Added,
            LogEventType::Removed,
            LogEventType::Expired,
        ] {
            assert_eq!(ty.as_str().parse::<LogEventType>(), Ok(ty));
        }
        assert!("renamed".parse::<LogEventType>().is_err());
    }

    #[test]
    fn batch_events_follow_applied_units_only() {
        let Ok(a) = Slug::parse("a") else {
            panic!("valid slug");
        };
        let Ok(b) = Slug::parse("b") else {
            panic!("valid slug");
        };
        let mut report = BatchReport::new(UserId::new(3));
        report.record_applied(MembershipChange::append(a, None));
        report.record_failure(MembershipChange::append(b.clone(), None), "boom");
        report.record_applied(MembershipChange::remove(b));

        let events = LogEvent::from_batch(&report);
        let summary: Vec<(&str, LogEventType)> = events
            .iter()
            .map(|e| (e.slug.as_str(), e.event_type))
            .collect();
        assert_eq!(
            summary,
            vec![("a", LogEventType::Added), ("b", LogEventType::Removed)]
        );
    }

    #[test]
    fn removed_without_slug_is_skipped() {
        let removed = vec![
            RemovedMembership {
                user_id: UserId::new(1),
                slug: Some("vip".to_string()),
            },
            RemovedMembership {
                user_id: UserId::new(2),
                slug: None,
            },
        ];
        let events = LogEvent::from_removed(&removed, LogEventType::Expired);
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(|e| e.user_id), Some(UserId::new(1)));
    }
}
