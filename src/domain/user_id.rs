//! Type-safe user identifier.
//!
//! [`UserId`] wraps the externally supplied integer id of a user so that it
//! cannot be confused with a segment id. Users have no row of their own:
//! the id only ever appears inside membership relations and log entries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a user, as assigned by the calling system.
///
/// Stored in `INTEGER` columns, hence the `i32` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    /// Wraps a raw user id.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw integer value, e.g. for binding into a query.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}
