//! PostgreSQL implementation of the segmentation store.
//!
//! Every mutating operation runs in one transaction taken from the shared
//! `sqlx::PgPool`. Inside `modify_user` each unit additionally runs in its
//! own savepoint: PostgreSQL aborts the whole transaction on the first
//! failed statement, so rolling back to the savepoint is what keeps one bad
//! unit from poisoning the rest of the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool, Postgres, Transaction};

use super::SegmentationStore;
use super::models::StoredLogEntry;
use crate::domain::{
    BatchReport, LogEvent, LogEventType, MembershipChange, RemovedMembership, Slug, UserId,
};
use crate::error::{SegmentationError, TransactionStage};

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// What happened to one unit of a batch.
enum UnitOutcome {
    Applied,
    Noop,
    Failed(String),
}

impl PostgresStore {
    /// Creates a new store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, SegmentationError> {
        self.pool
            .begin()
            .await
            .map_err(|e| SegmentationError::transaction(TransactionStage::Begin, &e))
    }

    async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), SegmentationError> {
        tx.commit()
            .await
            .map_err(|e| SegmentationError::transaction(TransactionStage::Commit, &e))
    }

    /// Rolls the transaction back and hands the original error on.
    async fn abort(tx: Transaction<'_, Postgres>, err: SegmentationError) -> SegmentationError {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "rollback failed; connection will be discarded");
        }
        err
    }

    /// Runs one unit of a batch inside its own savepoint.
    ///
    /// Statement failures roll back to the savepoint and come back as
    /// [`UnitOutcome::Failed`]; only savepoint handling itself can fail the
    /// call.
    async fn run_unit(
        conn: &mut PgConnection,
        user_id: UserId,
        change: &MembershipChange,
    ) -> Result<UnitOutcome, SegmentationError> {
        let mut savepoint = conn
            .begin()
            .await
            .map_err(|e| SegmentationError::transaction(TransactionStage::Begin, &e))?;

        let result = match change {
            MembershipChange::Append { slug, expires_at } => {
                sqlx::query(
                    "INSERT INTO user_segment_relations (user_id, segment_id, expires_at) \
                     SELECT $1, id, $3 FROM segments WHERE slug = $2",
                )
                .bind(user_id.get())
                .bind(slug.as_str())
                .bind(*expires_at)
                .execute(&mut *savepoint)
                .await
            }
            MembershipChange::Remove { slug } => {
                sqlx::query(
                    "DELETE FROM user_segment_relations \
                     WHERE user_id = $1 AND segment_id = (SELECT id FROM segments WHERE slug = $2)",
                )
                .bind(user_id.get())
                .bind(slug.as_str())
                .execute(&mut *savepoint)
                .await
            }
        };

        match result {
            Ok(done) => {
                savepoint
                    .commit()
                    .await
                    .map_err(|e| SegmentationError::transaction(TransactionStage::Commit, &e))?;
                Ok(match (done.rows_affected(), change.is_append()) {
                    (0, true) => UnitOutcome::Failed("segment does not exist".to_string()),
                    (0, false) => UnitOutcome::Noop,
                    _ => UnitOutcome::Applied,
                })
            }
            Err(e) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(|e| SegmentationError::transaction(TransactionStage::Rollback, &e))?;
                Ok(UnitOutcome::Failed(driver_message(&e)))
            }
        }
    }
}

/// Message text of a driver error without the `error returned from
/// database:` prefix.
fn driver_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SegmentationStore for PostgresStore {
    async fn add_segment(&self, slug: &Slug) -> Result<i32, SegmentationError> {
        let mut tx = self.begin().await?;

        let inserted = sqlx::query_scalar::<_, i32>(
            "INSERT INTO segments (slug) VALUES ($1) RETURNING id",
        )
        .bind(slug.as_str())
        .fetch_one(&mut *tx)
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                let err = SegmentationError::from_sqlx(
                    format!("error while adding segment \"{slug}\" to the database"),
                    &e,
                );
                return Err(Self::abort(tx, err).await);
            }
        };

        Self::commit(tx).await?;
        Ok(id)
    }

    async fn delete_segment(
        &self,
        slug: &Slug,
    ) -> Result<Vec<RemovedMembership>, SegmentationError> {
        let context = || format!("error while deleting segment with slug = {slug} from the database");
        let mut tx = self.begin().await?;

        let users = sqlx::query_scalar::<_, i32>(
            "DELETE FROM user_segment_relations \
             WHERE segment_id = (SELECT id FROM segments WHERE slug = $1) RETURNING user_id",
        )
        .bind(slug.as_str())
        .fetch_all(&mut *tx)
        .await;

        let users = match users {
            Ok(users) => users,
            Err(e) => return Err(Self::abort(tx, SegmentationError::from_sqlx(context(), &e)).await),
        };

        if let Err(e) = sqlx::query("DELETE FROM segments WHERE slug = $1")
            .bind(slug.as_str())
            .execute(&mut *tx)
            .await
        {
            return Err(Self::abort(tx, SegmentationError::from_sqlx(context(), &e)).await);
        }

        Self::commit(tx).await?;

        Ok(users
            .into_iter()
            .map(|user_id| RemovedMembership {
                user_id: UserId::new(user_id),
                slug: Some(slug.to_string()),
            })
            .collect())
    }

    async fn modify_user(
        &self,
        user_id: UserId,
        changes: &[MembershipChange],
    ) -> Result<BatchReport, SegmentationError> {
        let mut tx = self.begin().await?;
        let mut report = BatchReport::new(user_id);

        for change in changes {
            match Self::run_unit(&mut tx, user_id, change).await {
                Ok(UnitOutcome::Applied) => report.record_applied(change.clone()),
                Ok(UnitOutcome::Noop) => report.record_noop(),
                Ok(UnitOutcome::Failed(message)) => {
                    tracing::warn!(%user_id, slug = %change.slug(), %message, "membership change failed");
                    report.record_failure(change.clone(), message);
                }
                Err(e) => return Err(Self::abort(tx, e).await),
            }
        }

        Self::commit(tx).await?;
        Ok(report)
    }

    async fn get_user_relations(&self, user_id: UserId) -> Result<Vec<String>, SegmentationError> {
        sqlx::query_scalar::<_, String>(
            "SELECT s.slug FROM segments s \
             JOIN user_segment_relations r ON r.segment_id = s.id \
             WHERE r.user_id = $1 AND (r.expires_at IS NULL OR r.expires_at > now()) \
             ORDER BY s.slug",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SegmentationError::from_sqlx(
                format!("error while getting user {user_id}'s segments from the database"),
                &e,
            )
        })
    }

    async fn tidy_relations(&self) -> Result<Vec<RemovedMembership>, SegmentationError> {
        let mut tx = self.begin().await?;

        let removed = sqlx::query_as::<_, (i32, Option<String>)>(
            "WITH expired AS ( \
                 DELETE FROM user_segment_relations WHERE expires_at <= now() \
                 RETURNING user_id, segment_id \
             ) \
             SELECT e.user_id, s.slug FROM expired e LEFT JOIN segments s ON s.id = e.segment_id",
        )
        .fetch_all(&mut *tx)
        .await;

        let removed = match removed {
            Ok(rows) => rows,
            Err(e) => {
                let err = SegmentationError::from_sqlx("error while tidying relations", &e);
                return Err(Self::abort(tx, err).await);
            }
        };

        Self::commit(tx).await?;

        Ok(removed
            .into_iter()
            .map(|(user_id, slug)| RemovedMembership {
                user_id: UserId::new(user_id),
                slug,
            })
            .collect())
    }

    async fn append_logs(&self, events: &[LogEvent]) -> Result<(), SegmentationError> {
        if events.is_empty() {
            return Ok(());
        }

        let user_ids: Vec<i32> = events.iter().map(|e| e.user_id.get()).collect();
        let slugs: Vec<String> = events.iter().map(|e| e.slug.clone()).collect();
        let types: Vec<String> = events
            .iter()
            .map(|e| e.event_type.as_str().to_string())
            .collect();

        sqlx::query(
            "INSERT INTO user_segment_logs (user_id, slug, event_type) \
             SELECT * FROM UNNEST($1::int4[], $2::text[], $3::text[])",
        )
        .bind(user_ids)
        .bind(slugs)
        .bind(types)
        .execute(&self.pool)
        .await
        .map_err(|e| SegmentationError::from_sqlx("error while writing logs", &e))?;

        Ok(())
    }

    async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredLogEntry>, SegmentationError> {
        let rows = sqlx::query_as::<_, (i64, i32, String, String, DateTime<Utc>)>(
            "SELECT id, user_id, slug, event_type, created_at FROM user_segment_logs \
             WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at ASC, id ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SegmentationError::from_sqlx("error while getting logs from the database", &e))?;

        rows.into_iter()
            .map(|(id, user_id, slug, event_type, created_at)| {
                let event_type = event_type.parse::<LogEventType>().map_err(|message: String| {
                    SegmentationError::store(format!("error while reading log entry {id}"), message)
                })?;
                Ok(StoredLogEntry {
                    id,
                    user_id: UserId::new(user_id),
                    slug,
                    event_type,
                    created_at,
                })
            })
            .collect()
    }
}
