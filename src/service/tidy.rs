//! Periodic removal of expired memberships.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SegmentationService;

/// Shortest interval the sweeper accepts.
pub const MIN_TIDY_INTERVAL: Duration = Duration::from_millis(1);

/// Background task that calls [`SegmentationService::tidy_relations`] on a
/// fixed interval.
///
/// The first sweep runs immediately. A failed sweep is logged and the loop
/// carries on; if a sweep overruns the interval, missed ticks are skipped
/// rather than fired back to back.
#[derive(Debug)]
pub struct TidySweeper {
    service: Arc<SegmentationService>,
    interval: Duration,
}

impl TidySweeper {
    /// Creates a sweeper. Intervals below [`MIN_TIDY_INTERVAL`] are raised
    /// to it.
    #[must_use]
    pub fn new(service: Arc<SegmentationService>, interval: Duration) -> Self {
        Self {
            service,
            interval: interval.max(MIN_TIDY_INTERVAL),
        }
    }

    /// Runs one sweep and logs the outcome. Returns the number of removed
    /// memberships, or `None` if the sweep failed.
    pub async fn sweep_once(&self) -> Option<u64> {
        match self.service.tidy_relations().await {
            Ok(removed) => {
                tracing::debug!(removed, "tidy sweep finished");
                Some(removed)
            }
            Err(e) => {
                tracing::error!(error = %e, "tidy sweep failed");
                None
            }
        }
    }

    /// Spawns the sweep loop on the current runtime.
    ///
    /// A stop request is only observed between sweeps, so a sweep that has
    /// started always runs to commit or rollback.
    #[must_use]
    pub fn spawn(self) -> TidyHandle {
        let (stop, mut stopped) = watch::channel(false);
        tracing::info!(interval = ?self.interval, "tidy sweeper started");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!("tidy sweeper stopped");
        });

        TidyHandle { stop, task }
    }
}

/// Handle to a running [`TidySweeper`].
#[derive(Debug)]
pub struct TidyHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TidyHandle {
    /// Returns `true` once the sweep loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the loop to stop and waits for it, letting an in-flight sweep
    /// finish first.
    pub async fn shutdown(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "tidy sweeper task failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio_test::assert_ok;

    use crate::domain::{
        BatchReport, LogEvent, MembershipChange, RemovedMembership, SegmentAppend, Slug, UserId,
    };
    use crate::error::SegmentationError;
    use crate::persistence::{MemoryStore, SegmentationStore, StoredLogEntry};

    fn slug(s: &str) -> Slug {
        let Ok(slug) = Slug::parse(s) else {
            panic!("invalid test slug {s}");
        };
        slug
    }

    /// Fails the first `failures` tidy calls, then delegates.
    #[derive(Debug)]
    struct FlakyStore {
        inner: MemoryStore,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SegmentationStore for FlakyStore {
        async fn add_segment(&self, slug: &Slug) -> Result<i32, SegmentationError> {
            self.inner.add_segment(slug).await
        }

        async fn delete_segment(
            &self,
            slug: &Slug,
        ) -> Result<Vec<RemovedMembership>, SegmentationError> {
            self.inner.delete_segment(slug).await
        }

        async fn modify_user(
            &self,
            user_id: UserId,
            changes: &[MembershipChange],
        ) -> Result<BatchReport, SegmentationError> {
            self.inner.modify_user(user_id, changes).await
        }

        async fn get_user_relations(
            &self,
            user_id: UserId,
        ) -> Result<Vec<String>, SegmentationError> {
            self.inner.get_user_relations(user_id).await
        }

        async fn tidy_relations(&self) -> Result<Vec<RemovedMembership>, SegmentationError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(SegmentationError::store(
                    "error while tidying relations",
                    "connection refused",
                ));
            }
            self.inner.tidy_relations().await
        }

        async fn append_logs(&self, events: &[LogEvent]) -> Result<(), SegmentationError> {
            self.inner.append_logs(events).await
        }

        async fn get_logs(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<StoredLogEntry>, SegmentationError> {
            self.inner.get_logs(from, to).await
        }
    }

    async fn seed_expired(service: &SegmentationService) {
        assert_ok!(service.add_segment(&slug("trial")).await);
        assert_ok!(
            service
                .modify_user(
                    UserId::new(1),
                    vec![SegmentAppend::until(
                        slug("trial"),
                        Utc::now() - chrono::Duration::seconds(1)
                    )],
                    vec![],
                )
                .await
        );
    }

    async fn wait_for_empty(store: &MemoryStore) -> bool {
        for _ in 0..100 {
            if store.relation_count().await == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn sweeper_removes_expired_memberships() {
        let store = MemoryStore::new();
        let service = Arc::new(SegmentationService::new(Arc::new(store.clone()), true));
        seed_expired(&service).await;
        assert_eq!(store.relation_count().await, 1);

        let handle = TidySweeper::new(service, Duration::from_millis(10)).spawn();
        assert!(wait_for_empty(&store).await);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn sweeper_survives_failed_sweeps() {
        let store = MemoryStore::new();
        let flaky = FlakyStore {
            inner: store.clone(),
            failures: 3,
            calls: AtomicUsize::new(0),
        };
        let service = Arc::new(SegmentationService::new(Arc::new(flaky), true));
        seed_expired(&service).await;

        let handle = TidySweeper::new(service, Duration::from_millis(5)).spawn();
        assert!(wait_for_empty(&store).await);
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn sweep_once_reports_failure_as_none() {
        let flaky = FlakyStore {
            inner: MemoryStore::new(),
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let service = Arc::new(SegmentationService::new(Arc::new(flaky), true));
        let sweeper = TidySweeper::new(service, Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await, None);
        assert_eq!(sweeper.sweep_once().await, Some(0));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let service = Arc::new(SegmentationService::new(Arc::new(MemoryStore::new()), true));
        let handle = TidySweeper::new(service, Duration::from_secs(3600)).spawn();
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await;
        assert!(stopped.is_ok());
    }

    #[test]
    fn zero_interval_is_raised() {
        let service = Arc::new(SegmentationService::new(Arc::new(MemoryStore::new()), true));
        let sweeper = TidySweeper::new(service, Duration::ZERO);
        assert_eq!(sweeper.interval, MIN_TIDY_INTERVAL);
    }
}
