//! Segmentation service: the engine operations the HTTP layer calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::membership::plan_changes;
use crate::domain::{BatchReport, LogEvent, LogEventType, SegmentAppend, Slug, UserId};
use crate::error::SegmentationError;
use crate::persistence::{SegmentationStore, StoredLogEntry};

/// Orchestration layer over a [`SegmentationStore`].
///
/// Holds no state besides the store handle: every call goes straight to
/// the store in its own transaction. After a successful mutation the
/// corresponding audit log events are written best-effort.
#[derive(Debug, Clone)]
pub struct SegmentationService {
    store: Arc<dyn SegmentationStore>,
    audit_log: bool,
}

impl SegmentationService {
    /// Creates a new service. `audit_log` enables audit log writes.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentationStore>, audit_log: bool) -> Self {
        Self { store, audit_log }
    }

    /// Creates a segment and returns its id.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Constraint`] if the slug already exists, or a
    /// transaction error.
    pub async fn add_segment(&self, slug: &Slug) -> Result<i32, SegmentationError> {
        let id = self.store.add_segment(slug).await?;
        tracing::info!(%slug, id, "segment created");
        Ok(id)
    }

    /// Deletes a segment and every membership in it. Deleting an unknown
    /// slug succeeds.
    ///
    /// # Errors
    ///
    /// Any store failure; the segment and its memberships are then intact.
    pub async fn delete_segment(&self, slug: &Slug) -> Result<(), SegmentationError> {
        let removed = self.store.delete_segment(slug).await?;
        tracing::info!(%slug, memberships = removed.len(), "segment deleted");
        self.record(LogEvent::from_removed(&removed, LogEventType::Removed))
            .await;
        Ok(())
    }

    /// Adds the user to `appends` and removes them from `removes` in one
    /// transaction.
    ///
    /// Appends run first, then removes, each in the given order. A failing
    /// unit does not stop the others and everything that succeeded is
    /// committed. On success the report of applied units is returned.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::PartialFailure`] carrying the full report when
    /// one or more units failed; a transaction error when nothing could be
    /// committed.
    pub async fn modify_user(
        &self,
        user_id: UserId,
        appends: Vec<SegmentAppend>,
        removes: Vec<Slug>,
    ) -> Result<BatchReport, SegmentationError> {
        let changes = plan_changes(appends, removes);
        let report = self.store.modify_user(user_id, &changes).await?;
        tracing::debug!(
            %user_id,
            attempted = report.attempted(),
            applied = report.applied().len(),
            failed = report.failures().len(),
            "user memberships modified"
        );

        self.record(LogEvent::from_batch(&report)).await;

        if report.is_success() {
            Ok(report)
        } else {
            Err(SegmentationError::PartialFailure(report))
        }
    }

    /// Returns the slugs of the user's current memberships, sorted.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::Store`] if the query fails.
    pub async fn get_user_relations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<String>, SegmentationError> {
        self.store.get_user_relations(user_id).await
    }

    /// Deletes every expired membership and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Any store failure; nothing is removed in that case.
    pub async fn tidy_relations(&self) -> Result<u64, SegmentationError> {
        let removed = self.store.tidy_relations().await?;
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "expired memberships tidied");
        }
        self.record(LogEvent::from_removed(&removed, LogEventType::Expired))
            .await;
        Ok(removed.len() as u64)
    }

    /// Returns audit log entries created in `[from, to)`.
    ///
    /// # Errors
    ///
    /// [`SegmentationError::InvalidRequest`] if `from` is not before `to`,
    /// or a store failure.
    pub async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredLogEntry>, SegmentationError> {
        if from >= to {
            return Err(SegmentationError::InvalidRequest(format!(
                "log range start {from} must be before its end {to}"
            )));
        }
        self.store.get_logs(from, to).await
    }

    /// Writes audit events; failures are logged and swallowed.
    async fn record(&self, events: Vec<LogEvent>) {
        if !self.audit_log || events.is_empty() {
            return;
        }
        if let Err(e) = self.store.append_logs(&events).await {
            tracing::warn!(error = %e, count = events.len(), "failed to write audit log");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn slug(s: &str) -> Slug {
        let Ok(slug) = Slug::parse(s) else {
            panic!("invalid test slug {s}");
        };
        slug
    }

    fn make_service() -> (SegmentationService, MemoryStore) {
        let store = MemoryStore::new();
        let service = SegmentationService::new(Arc::new(store.clone()), true);
        (service, store)
    }

    fn far_future() -> DateTime<Utc> {
        Utc::now() + Duration::days(365 * 100)
    }

    #[tokio::test]
    async fn vip_scenario() {
        let (service, _) = make_service();
        let user = UserId::new(10);

        assert_ok!(service.add_segment(&slug("vip")).await);
        assert_ok!(
            service
                .modify_user(user, vec![SegmentAppend::permanent(slug("vip"))], vec![])
                .await
        );
        assert_eq!(
            assert_ok!(service.get_user_relations(user).await),
            vec!["vip".to_string()]
        );

        assert_ok!(service.delete_segment(&slug("vip")).await);
        assert!(assert_ok!(service.get_user_relations(user).await).is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_every_user() {
        let (service, store) = make_service();
        assert_ok!(service.add_segment(&slug("promo")).await);
        for id in 1..=3 {
            assert_ok!(
                service
                    .modify_user(
                        UserId::new(id),
                        vec![SegmentAppend::permanent(slug("promo"))],
                        vec![]
                    )
                    .await
            );
        }
        assert_eq!(store.relation_count().await, 3);

        assert_ok!(service.delete_segment(&slug("promo")).await);
        assert_eq!(store.relation_count().await, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (service, _) = make_service();
        assert_ok!(service.add_segment(&slug("gone")).await);
        assert_ok!(service.delete_segment(&slug("gone")).await);
        assert_ok!(service.delete_segment(&slug("gone")).await);
    }

    #[tokio::test]
    async fn append_then_remove() {
        let (service, _) = make_service();
        let user = UserId::new(7);
        assert_ok!(service.add_segment(&slug("beta")).await);

        assert_ok!(
            service
                .modify_user(
                    user,
                    vec![SegmentAppend::until(slug("beta"), far_future())],
                    vec![]
                )
                .await
        );
        assert!(
            assert_ok!(service.get_user_relations(user).await).contains(&"beta".to_string())
        );

        assert_ok!(service.modify_user(user, vec![], vec![slug("beta")]).await);
        assert!(assert_ok!(service.get_user_relations(user).await).is_empty());
    }

    #[tokio::test]
    async fn partial_failure_applies_the_rest_and_reports_one_line() {
        let (service, _) = make_service();
        let user = UserId::new(11);
        for s in ["a", "b", "c"] {
            assert_ok!(service.add_segment(&slug(s)).await);
        }
        assert_ok!(
            service
                .modify_user(user, vec![SegmentAppend::permanent(slug("b"))], vec![])
                .await
        );

        let result = service
            .modify_user(
                user,
                vec![
                    SegmentAppend::permanent(slug("a")),
                    SegmentAppend::permanent(slug("b")),
                    SegmentAppend::permanent(slug("c")),
                ],
                vec![],
            )
            .await;

        let Err(SegmentationError::PartialFailure(report)) = result else {
            panic!("expected a partial failure, got {result:?}");
        };
        assert_eq!(report.applied().len(), 2);
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines.first().is_some_and(|l| l.contains("\"b\"")));

        assert_eq!(
            assert_ok!(service.get_user_relations(user).await),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn append_to_unknown_segment_is_a_unit_failure() {
        let (service, _) = make_service();
        let user = UserId::new(12);
        assert_ok!(service.add_segment(&slug("known")).await);

        let result = service
            .modify_user(
                user,
                vec![
                    SegmentAppend::permanent(slug("unknown")),
                    SegmentAppend::permanent(slug("known")),
                ],
                vec![slug("never-joined")],
            )
            .await;

        let Err(SegmentationError::PartialFailure(report)) = result else {
            panic!("expected a partial failure, got {result:?}");
        };
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.attempted(), 3);
        assert_eq!(
            report.to_string(),
            "error while adding user 12 to the segment \"unknown\": segment does not exist"
        );
        assert_eq!(
            assert_ok!(service.get_user_relations(user).await),
            vec!["known".to_string()]
        );
    }

    #[tokio::test]
    async fn expired_memberships_are_hidden_then_swept() {
        let (service, store) = make_service();
        let user = UserId::new(20);
        assert_ok!(service.add_segment(&slug("flash")).await);
        assert_ok!(
            service
                .modify_user(
                    user,
                    vec![SegmentAppend::until(
                        slug("flash"),
                        Utc::now() - Duration::seconds(5)
                    )],
                    vec![]
                )
                .await
        );

        assert!(assert_ok!(service.get_user_relations(user).await).is_empty());
        assert_eq!(store.relation_count().await, 1);

        assert_eq!(assert_ok!(service.tidy_relations().await), 1);
        assert_eq!(store.relation_count().await, 0);
        assert_eq!(assert_ok!(service.tidy_relations().await), 0);
    }

    #[tokio::test]
    async fn readding_a_deleted_slug_gets_a_new_id() {
        let (service, _) = make_service();
        let first = assert_ok!(service.add_segment(&slug("again")).await);
        assert_ok!(service.delete_segment(&slug("again")).await);
        let second = assert_ok!(service.add_segment(&slug("again")).await);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn audit_log_follows_mutations() {
        let (service, _) = make_service();
        let start = Utc::now() - Duration::seconds(1);
        let user = UserId::new(30);
        assert_ok!(service.add_segment(&slug("log")).await);
        assert_ok!(
            service
                .modify_user(user, vec![SegmentAppend::permanent(slug("log"))], vec![])
                .await
        );
        assert_ok!(service.modify_user(user, vec![], vec![slug("log")]).await);
        // Nothing to remove: no event.
        assert_ok!(service.modify_user(user, vec![], vec![slug("log")]).await);

        let logs = assert_ok!(
            service
                .get_logs(start, Utc::now() + Duration::seconds(1))
                .await
        );
        let kinds: Vec<LogEventType> = logs.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![LogEventType::Added, LogEventType::Removed]);
    }

    #[tokio::test]
    async fn audit_log_can_be_disabled() {
        let store = MemoryStore::new();
        let service = SegmentationService::new(Arc::new(store), false);
        let start = Utc::now() - Duration::seconds(1);
        assert_ok!(service.add_segment(&slug("quiet")).await);
        assert_ok!(
            service
                .modify_user(
                    UserId::new(1),
                    vec![SegmentAppend::permanent(slug("quiet"))],
                    vec![]
                )
                .await
        );
        let logs = assert_ok!(
            service
                .get_logs(start, Utc::now() + Duration::seconds(1))
                .await
        );
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn inverted_log_range_is_rejected() {
        let (service, _) = make_service();
        let now = Utc::now();
        let err = assert_err!(service.get_logs(now, now - Duration::hours(1)).await);
        assert!(matches!(err, SegmentationError::InvalidRequest(_)));
    }
}
