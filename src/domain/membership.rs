//! Membership changes and expiration handling.

use chrono::{DateTime, Utc};

use super::{Slug, UserId};

/// Unix timestamp (seconds) of `0001-01-01T00:00:00Z`.
///
/// Clients built on languages with a zero-valued time type send this value
/// when they mean "no expiration".
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Normalizes a requested expiration.
///
/// `None` and any instant at or before `0001-01-01T00:00:00Z` mean the
/// membership never expires and map to `None`. Every other value, including
/// instants already in the past, is kept as given.
#[must_use]
pub fn normalize_expiry(expires_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    expires_at.filter(|at| at.timestamp() > ZERO_TIME_SECS)
}

/// A single unit of work inside a `modify_user` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// Add the user to a segment.
    Append {
        /// Target segment.
        slug: Slug,
        /// Expiration of the new relation; `None` never expires.
        expires_at: Option<DateTime<Utc>>,
    },
    /// Remove the user from a segment.
    Remove {
        /// Target segment.
        slug: Slug,
    },
}

impl MembershipChange {
    /// Builds an append, normalizing the expiration.
    #[must_use]
    pub fn append(slug: Slug, expires_at: Option<DateTime<Utc>>) -> Self {
        Self::Append {
            slug,
            expires_at: normalize_expiry(expires_at),
        }
    }

    /// Builds a remove.
    #[must_use]
    pub fn remove(slug: Slug) -> Self {
        Self::Remove { slug }
    }

    /// Returns the segment the change targets.
    #[must_use]
    pub fn slug(&self) -> &Slug {
        match self {
            Self::Append { slug, .. } | Self::Remove { slug } => slug,
        }
    }

    /// Returns `true` for appends.
    #[must_use]
    pub const fn is_append(&self) -> bool {
        matches!(self, Self::Append { .. })
    }
}

/// Requested append as handed to the engine: slug plus optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentAppend {
    /// Segment to join.
    pub slug: Slug,
    /// Expiration; `None` or the zero time means never.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SegmentAppend {
    /// Creates an append that never expires.
    #[must_use]
    pub fn permanent(slug: Slug) -> Self {
        Self {
            slug,
            expires_at: None,
        }
    }

    /// Creates an append expiring at the given instant.
    #[must_use]
    pub fn until(slug: Slug, expires_at: DateTime<Utc>) -> Self {
        Self {
            slug,
            expires_at: Some(expires_at),
        }
    }
}

/// A membership removed by segment deletion or by the tidy sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedMembership {
    /// User that lost the membership.
    pub user_id: UserId,
    /// Slug of the segment, if it still resolved at removal time.
    pub slug: Option<String>,
}

/// Orders the changes of one `modify_user` call: appends first, then
/// removes, each in caller order.
#[must_use]
pub fn plan_changes(appends: Vec<SegmentAppend>, removes: Vec<Slug>) -> Vec<MembershipChange> {
    appends
        .into_iter()
        .map(|a| MembershipChange::append(a.slug, a.expires_at))
        .chain(removes.into_iter().map(MembershipChange::remove))
        .collect()
}
