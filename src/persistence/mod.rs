//! Persistence layer: segments, membership relations and the audit log.
//!
//! [`SegmentationStore`] is the storage contract the service layer works
//! against. [`PostgresStore`] implements it over `sqlx::PgPool`;
//! [`MemoryStore`] implements the same contract in process for tests and
//! local runs. [`schema`] holds the startup schema guard.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod schema;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BatchReport, LogEvent, MembershipChange, RemovedMembership, Slug, UserId};
use crate::error::SegmentationError;

pub use memory::MemoryStore;
pub use models::StoredLogEntry;
pub use postgres::PostgresStore;

/// Storage contract for the segmentation engine.
///
/// Every method runs in its own short-lived transaction; implementations
/// hold no caches, so reads always see the latest committed state.
#[async_trait]
pub trait SegmentationStore: Send + Sync + fmt::Debug {
    /// Inserts a segment and returns its generated id.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Constraint`] if the slug exists,
    /// [`SegmentationError::Transaction`] if the transaction fails.
    async fn add_segment(&self, slug: &Slug) -> Result<i32, SegmentationError>;

    /// Deletes a segment together with all of its relations, atomically.
    /// Returns the memberships that were removed. Unknown slugs are a no-op.
    ///
    /// # Errors
    ///
    /// Any statement or transaction failure; the store is left unchanged.
    async fn delete_segment(&self, slug: &Slug)
    -> Result<Vec<RemovedMembership>, SegmentationError>;

    /// Applies every change in order inside one transaction, isolating
    /// per-unit failures, and commits.
    ///
    /// Unit failures are reported in the returned [`BatchReport`], not as
    /// an `Err`.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Transaction`] if the transaction cannot begin
    /// or commit; nothing is applied in that case.
    async fn modify_user(
        &self,
        user_id: UserId,
        changes: &[MembershipChange],
    ) -> Result<BatchReport, SegmentationError>;

    /// Returns the slugs of the user's non-expired memberships, sorted.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Store`] if the query fails.
    async fn get_user_relations(&self, user_id: UserId) -> Result<Vec<String>, SegmentationError>;

    /// Deletes every relation whose expiration has passed and returns the
    /// removed memberships.
    ///
    /// # Errors
    ///
    /// Any statement or transaction failure.
    async fn tidy_relations(&self) -> Result<Vec<RemovedMembership>, SegmentationError>;

    /// Appends audit log events.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Store`] if the insert fails.
    async fn append_logs(&self, events: &[LogEvent]) -> Result<(), SegmentationError>;

    /// Returns audit log entries created in `[from, to)`, oldest first.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Store`] if the query fails.
    async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredLogEntry>, SegmentationError>;
}
