//! Startup schema guard.
//!
//! Before the engine serves anything, [`prepare`] optionally creates the
//! tables and then checks that each one exposes the expected columns with
//! the expected types. A mismatch is fatal: the engine cannot run against
//! an incompatible store.

use sqlx::PgPool;

use crate::error::SegmentationError;

/// Expected shape of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    /// Table name.
    pub name: &'static str,
    /// `(column_name, information_schema data_type)` pairs.
    pub columns: &'static [(&'static str, &'static str)],
    /// Human-readable shape used in mismatch messages.
    pub shape: &'static str,
}

/// Segment definitions.
pub const SEGMENTS: TableSpec = TableSpec {
    name: "segments",
    columns: &[("id", "integer"), ("slug", "text")],
    shape: "{ id INTEGER; slug TEXT }",
};

/// User to segment relations.
pub const RELATIONS: TableSpec = TableSpec {
    name: "user_segment_relations",
    columns: &[
        ("user_id", "integer"),
        ("segment_id", "integer"),
        ("expires_at", "timestamp with time zone"),
    ],
    shape: "{ user_id INTEGER; segment_id INTEGER; expires_at TIMESTAMPTZ }",
};

/// Audit log.
pub const LOGS: TableSpec = TableSpec {
    name: "user_segment_logs",
    columns: &[
        ("user_id", "integer"),
        ("slug", "text"),
        ("event_type", "text"),
        ("created_at", "timestamp with time zone"),
    ],
    shape: "{ user_id INTEGER; slug TEXT; event_type TEXT; created_at TIMESTAMPTZ }",
};

const CREATE_CORE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS segments (
        id SERIAL UNIQUE,
        slug TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS user_segment_relations (
        user_id INTEGER NOT NULL,
        segment_id INTEGER NOT NULL REFERENCES segments (id),
        expires_at TIMESTAMPTZ,
        CONSTRAINT unique_user_segment UNIQUE (user_id, segment_id)
    )",
    "CREATE INDEX IF NOT EXISTS user_segment_relations_expires_at_idx
        ON user_segment_relations (expires_at) WHERE expires_at IS NOT NULL",
];

const CREATE_LOGS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user_segment_logs (
        id BIGSERIAL PRIMARY KEY,
        user_id INTEGER NOT NULL,
        slug TEXT NOT NULL,
        event_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS user_segment_logs_created_at_idx
        ON user_segment_logs (created_at)",
];

/// Tables the engine needs; the audit log table only when it is enabled.
#[must_use]
pub fn required_tables(audit_log: bool) -> Vec<TableSpec> {
    let mut tables = vec![SEGMENTS, RELATIONS];
    if audit_log {
        tables.push(LOGS);
    }
    tables
}

/// Compares a table's actual columns against its expected shape.
///
/// Every expected column must be present with the expected type; extra
/// columns are allowed. Returns the mismatch message, if any.
#[must_use]
pub fn check_columns(table: &TableSpec, actual: &[(String, String)]) -> Option<String> {
    let proper = table.columns.iter().all(|(name, data_type)| {
        actual
            .iter()
            .any(|(n, t)| n == name && t.eq_ignore_ascii_case(data_type))
    });
    if proper {
        None
    } else {
        Some(format!(
            "'{0}' table is not ok: proper '{0}' table is {1}",
            table.name, table.shape
        ))
    }
}

/// Creates the tables if they do not exist yet.
///
/// # Errors
///
/// Returns [`SegmentationError::Store`] if any statement fails.
pub async fn create_tables(pool: &PgPool, audit_log: bool) -> Result<(), SegmentationError> {
    let extra: &[&str] = if audit_log { CREATE_LOGS } else { &[] };
    for statement in CREATE_CORE.iter().chain(extra) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| SegmentationError::from_sqlx("error while creating tables", &e))?;
    }
    tracing::info!(audit_log, "schema ensured");
    Ok(())
}

/// Verifies every required table.
///
/// # Errors
///
/// Returns [`SegmentationError::Schema`] listing every mismatched table, or
/// [`SegmentationError::Store`] if the catalog cannot be queried.
pub async fn verify(pool: &PgPool, audit_log: bool) -> Result<(), SegmentationError> {
    let mut mismatches = Vec::new();
    for table in required_tables(audit_log) {
        let actual = sqlx::query_as::<_, (String, String)>(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(table.name)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            SegmentationError::from_sqlx(format!("error while checking '{}' table", table.name), &e)
        })?;

        if let Some(mismatch) = check_columns(&table, &actual) {
            mismatches.push(mismatch);
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(SegmentationError::Schema(mismatches))
    }
}

/// Runs the guard: optional creation, then verification.
///
/// # Errors
///
/// See [`create_tables`] and [`verify`].
pub async fn prepare(
    pool: &PgPool,
    create: bool,
    audit_log: bool,
) -> Result<(), SegmentationError> {
    if create {
        create_tables(pool, audit_log).await?;
    }
    verify(pool, audit_log).await
}
