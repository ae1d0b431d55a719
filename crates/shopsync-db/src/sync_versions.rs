//! Immutable entity snapshots in `sync_versions`.

use chrono::{DateTime, Utc};
use shopsync_core::EntityType;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncVersionRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub version_number: i32,
    pub data_hash: String,
    pub data_snapshot: serde_json::Value,
    pub change_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Appends a snapshot as the entity's next version.
///
/// `version_number` is one past the entity's highest so far, starting at 1.
/// Callers holding a row lock on the entity get gap-free numbering; two
/// concurrent writers without one collide on the unique constraint instead of
/// sharing a number.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_sync_version<'e, E>(
    executor: E,
    entity_type: EntityType,
    entity_id: i64,
    data_hash: &str,
    data_snapshot: &serde_json::Value,
    change_id: Option<Uuid>,
    created_by: &str,
) -> Result<SyncVersionRow, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, SyncVersionRow>(
        "INSERT INTO sync_versions \
             (entity_type, entity_id, version_number, data_hash, data_snapshot, \
              change_id, created_by) \
         SELECT $1, $2, COALESCE(MAX(version_number), 0) + 1, $3, $4, $5, $6 \
         FROM sync_versions \
         WHERE entity_type = $1 AND entity_id = $2 \
         RETURNING id, entity_type, entity_id, version_number, data_hash, data_snapshot, \
                   change_id, created_by, created_at",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(data_hash)
    .bind(data_snapshot)
    .bind(change_id)
    .bind(created_by)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no version has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_version<'e, E>(executor: E, id: i64) -> Result<SyncVersionRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SyncVersionRow>(
        "SELECT id, entity_type, entity_id, version_number, data_hash, data_snapshot, \
                change_id, created_by, created_at \
         FROM sync_versions \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Version history of one entity, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_versions<'e, E>(
    executor: E,
    entity_type: EntityType,
    entity_id: i64,
) -> Result<Vec<SyncVersionRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, SyncVersionRow>(
        "SELECT id, entity_type, entity_id, version_number, data_hash, data_snapshot, \
                change_id, created_by, created_at \
         FROM sync_versions \
         WHERE entity_type = $1 AND entity_id = $2 \
         ORDER BY version_number",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
