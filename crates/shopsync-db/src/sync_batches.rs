//! Database operations for `sync_batches`.
//!
//! A batch is created `running` and leaves that status exactly once, through
//! [`finish_sync_batch`], [`fail_sync_batch`] or [`cancel_sync_batch`]. Each
//! of these is a guarded update that fails with
//! [`DbError::InvalidSyncBatchTransition`] when the batch is no longer running.

use std::fmt;

use chrono::{DateTime, Utc};
use shopsync_core::BatchStatus;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::DbError;

const BATCH_COLUMNS: &str = "id, batch_id, batch_type, trigger_source, status, total_items, \
     successful_items, failed_items, skipped_items, error_message, started_at, completed_at, \
     created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Pull,
    Push,
    Apply,
    SyncProducts,
    SyncCollections,
    InventoryCheck,
}

impl BatchType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchType::Pull => "pull",
            BatchType::Push => "push",
            BatchType::Apply => "apply",
            BatchType::SyncProducts => "sync_products",
            BatchType::SyncCollections => "sync_collections",
            BatchType::InventoryCheck => "inventory_check",
        }
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `sync_batches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncBatchRow {
    pub id: i64,
    pub batch_id: Uuid,
    pub batch_type: String,
    pub trigger_source: String,
    pub status: String,
    pub total_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    pub skipped_items: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Item counters written when a batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: i32,
    pub successful: i32,
    pub failed: i32,
    pub skipped: i32,
}

/// Creates a batch in `running` status with a fresh UUID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_batch<'e, E>(
    executor: E,
    batch_type: BatchType,
    trigger_source: &str,
) -> Result<SyncBatchRow, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, SyncBatchRow>(&format!(
        "INSERT INTO sync_batches (batch_id, batch_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'running') \
         RETURNING {BATCH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(batch_type.as_str())
    .bind(trigger_source)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// Writes the final counts and derives the status from them.
///
/// Returns the status the batch finished in.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncBatchTransition`] if the batch is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn finish_sync_batch<'e, E>(
    executor: E,
    batch_id: Uuid,
    counts: BatchCounts,
) -> Result<BatchStatus, DbError>
where
    E: PgExecutor<'e>,
{
    let status = BatchStatus::from_counts(counts.successful, counts.failed);
    let result = sqlx::query(
        "UPDATE sync_batches SET \
             status = $2, total_items = $3, successful_items = $4, \
             failed_items = $5, skipped_items = $6, completed_at = NOW() \
         WHERE batch_id = $1 AND status = 'running'",
    )
    .bind(batch_id)
    .bind(status.as_str())
    .bind(counts.total)
    .bind(counts.successful)
    .bind(counts.failed)
    .bind(counts.skipped)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncBatchTransition {
            batch_id,
            expected_status: "running",
        });
    }

    Ok(status)
}

/// Marks a running batch `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncBatchTransition`] if the batch is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_sync_batch<'e, E>(
    executor: E,
    batch_id: Uuid,
    error_message: &str,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE sync_batches \
         SET status = 'failed', error_message = $2, completed_at = NOW() \
         WHERE batch_id = $1 AND status = 'running'",
    )
    .bind(batch_id)
    .bind(error_message)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncBatchTransition {
            batch_id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a running batch `cancelled`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncBatchTransition`] if the batch is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn cancel_sync_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE sync_batches \
         SET status = 'cancelled', completed_at = NOW() \
         WHERE batch_id = $1 AND status = 'running'",
    )
    .bind(batch_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncBatchTransition {
            batch_id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a batch by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no batch has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_sync_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<SyncBatchRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SyncBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM sync_batches WHERE batch_id = $1"
    ))
    .bind(batch_id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` batches, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_batches<'e, E>(executor: E, limit: i64) -> Result<Vec<SyncBatchRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, SyncBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM sync_batches ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
