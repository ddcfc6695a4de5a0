//! Per-item outcome of a `modify_user` batch.
//!
//! Every append and remove in a batch is an independent unit. A unit that
//! fails is recorded as a [`UnitFailure`] and the batch carries on; the
//! [`BatchReport`] collects what was applied and what failed so that callers
//! get structured access to partial results.

use std::fmt;

use super::{MembershipChange, UserId};

/// A unit of a batch that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// User the batch was for.
    pub user_id: UserId,
    /// The change that failed.
    pub change: MembershipChange,
    /// Underlying cause as reported by the store.
    pub message: String,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            MembershipChange::Append { slug, .. } => write!(
                f,
                "error while adding user {} to the segment \"{}\": {}",
                self.user_id, slug, self.message
            ),
            MembershipChange::Remove { slug } => write!(
                f,
                "error while removing user {} from the segment \"{}\": {}",
                self.user_id, slug, self.message
            ),
        }
    }
}

/// Result of running every unit of a batch inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    user_id: UserId,
    attempted: usize,
    applied: Vec<MembershipChange>,
    failures: Vec<UnitFailure>,
}

impl BatchReport {
    /// Starts an empty report for the given user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            attempted: 0,
            applied: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Records a unit that changed the stored state.
    pub fn record_applied(&mut self, change: MembershipChange) {
        self.attempted += 1;
        self.applied.push(change);
    }

    /// Records a unit that ran cleanly but had nothing to change, such as
    /// removing a relation that does not exist.
    pub fn record_noop(&mut self) {
        self.attempted += 1;
    }

    /// Records a failed unit.
    pub fn record_failure(&mut self, change: MembershipChange, message: impl Into<String>) {
        self.attempted += 1;
        self.failures.push(UnitFailure {
            user_id: self.user_id,
            change,
            message: message.into(),
        });
    }

    /// User the batch was for.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Number of units executed.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.attempted
    }

    /// Units that changed the stored state, in processing order.
    #[must_use]
    pub fn applied(&self) -> &[MembershipChange] {
        &self.applied
    }

    /// Failed units, in processing order.
    #[must_use]
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// Returns `true` if no unit failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One line per failed unit, in processing order.
impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
