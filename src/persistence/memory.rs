//! In-memory implementation of the segmentation store.
//!
//! Honors the same contract as [`super::PostgresStore`]: unique slugs,
//! unique `(user, segment)` relations, per-unit failure isolation and
//! expiry-aware reads. A single async mutex stands in for the database's
//! transaction isolation, so every operation is atomic and serializable.
//! Used by tests and for running the service without a database.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::SegmentationStore;
use super::models::StoredLogEntry;
use crate::domain::{BatchReport, LogEvent, MembershipChange, RemovedMembership, Slug, UserId};
use crate::error::SegmentationError;

#[derive(Debug, Default)]
struct MemoryState {
    next_segment_id: i32,
    next_log_id: i64,
    /// slug -> segment id
    segments: BTreeMap<String, i32>,
    /// (user id, segment id) -> expiry
    relations: BTreeMap<(UserId, i32), Option<DateTime<Utc>>>,
    logs: Vec<StoredLogEntry>,
}

impl MemoryState {
    fn slug_of(&self, segment_id: i32) -> Option<String> {
        self.segments
            .iter()
            .find(|(_, id)| **id == segment_id)
            .map(|(slug, _)| slug.clone())
    }

    fn apply(&mut self, user_id: UserId, change: &MembershipChange) -> Result<bool, String> {
        let segment_id = self.segments.get(change.slug().as_str()).copied();
        match change {
            MembershipChange::Append { expires_at, .. } => {
                let segment_id = segment_id.ok_or_else(|| "segment does not exist".to_string())?;
                if self.relations.contains_key(&(user_id, segment_id)) {
                    return Err(
                        "duplicate key value violates unique constraint \"unique_user_segment\""
                            .to_string(),
                    );
                }
                self.relations.insert((user_id, segment_id), *expires_at);
                Ok(true)
            }
            MembershipChange::Remove { .. } => Ok(segment_id
                .and_then(|id| self.relations.remove(&(user_id, id)))
                .is_some()),
        }
    }
}

/// Process-local store. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored relations, expired ones included.
    pub async fn relation_count(&self) -> usize {
        self.state.lock().await.relations.len()
    }
}

fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|at| at > now)
}

#[async_trait]
impl SegmentationStore for MemoryStore {
    async fn add_segment(&self, slug: &Slug) -> Result<i32, SegmentationError> {
        let mut state = self.state.lock().await;
        if state.segments.contains_key(slug.as_str()) {
            return Err(SegmentationError::constraint(
                format!("error while adding segment \"{slug}\" to the database"),
                "duplicate key value violates unique constraint \"segments_pkey\"",
            ));
        }
        state.next_segment_id += 1;
        let id = state.next_segment_id;
        state.segments.insert(slug.to_string(), id);
        Ok(id)
    }

    async fn delete_segment(
        &self,
        slug: &Slug,
    ) -> Result<Vec<RemovedMembership>, SegmentationError> {
        let mut state = self.state.lock().await;
        let Some(segment_id) = state.segments.remove(slug.as_str()) else {
            return Ok(Vec::new());
        };

        let users: Vec<UserId> = state
            .relations
            .keys()
            .filter(|(_, seg)| *seg == segment_id)
            .map(|(user, _)| *user)
            .collect();
        for user in &users {
            state.relations.remove(&(*user, segment_id));
        }

        Ok(users
            .into_iter()
            .map(|user_id| RemovedMembership {
                user_id,
                slug: Some(slug.to_string()),
            })
            .collect())
    }

    async fn modify_user(
        &self,
        user_id: UserId,
        changes: &[MembershipChange],
    ) -> Result<BatchReport, SegmentationError> {
        let mut state = self.state.lock().await;
        let mut report = BatchReport::new(user_id);
        for change in changes {
            match state.apply(user_id, change) {
                Ok(true) => report.record_applied(change.clone()),
                Ok(false) => report.record_noop(),
                Err(message) => report.record_failure(change.clone(), message),
            }
        }
        Ok(report)
    }

    async fn get_user_relations(&self, user_id: UserId) -> Result<Vec<String>, SegmentationError> {
        let state = self.state.lock().await;
        let now = Utc::now();
        let mut slugs: Vec<String> = state
            .relations
            .range((user_id, i32::MIN)..=(user_id, i32::MAX))
            .filter(|(_, expires_at)| is_live(**expires_at, now))
            .filter_map(|((_, segment_id), _)| state.slug_of(*segment_id))
            .collect();
        slugs.sort();
        Ok(slugs)
    }

    async fn tidy_relations(&self) -> Result<Vec<RemovedMembership>, SegmentationError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let expired: Vec<(UserId, i32)> = state
            .relations
            .iter()
            .filter(|(_, expires_at)| !is_live(**expires_at, now))
            .map(|(key, _)| *key)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for (user_id, segment_id) in expired {
            state.relations.remove(&(user_id, segment_id));
            removed.push(RemovedMembership {
                user_id,
                slug: state.slug_of(segment_id),
            });
        }
        Ok(removed)
    }

    async fn append_logs(&self, events: &[LogEvent]) -> Result<(), SegmentationError> {
        let mut state = self.state.lock().await;
        let created_at = Utc::now();
        for event in events {
            state.next_log_id += 1;
            let id = state.next_log_id;
            state.logs.push(StoredLogEntry {
                id,
                user_id: event.user_id,
                slug: event.slug.clone(),
                event_type: event.event_type,
                created_at,
            });
        }
        Ok(())
    }

    async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredLogEntry>, SegmentationError> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|entry| entry.created_at >= from && entry.created_at < to)
            .cloned()
            .collect())
    }
}
