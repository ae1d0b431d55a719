//! Append-only `sync_audit_log`.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntryRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub action: String,
    pub actor: String,
    pub change_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    pub entity_type: &'a str,
    pub entity_id: Option<i64>,
    /// e.g. `approve`, `apply`, `rollback`.
    pub action: &'a str,
    pub actor: &'a str,
    pub change_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Appends one audit entry and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_audit<'e, E>(executor: E, entry: &NewAuditEntry<'_>) -> Result<i64, DbError>
where
    E: PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sync_audit_log \
             (entity_type, entity_id, action, actor, change_id, batch_id, details) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.action)
    .bind(entry.actor)
    .bind(entry.change_id)
    .bind(entry.batch_id)
    .bind(&entry.details)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Audit entries for one staged change, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_audit_entries_for_change<'e, E>(
    executor: E,
    change_id: Uuid,
) -> Result<Vec<AuditEntryRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, AuditEntryRow>(
        "SELECT id, entity_type, entity_id, action, actor, change_id, batch_id, details, \
                created_at \
         FROM sync_audit_log \
         WHERE change_id = $1 \
         ORDER BY id",
    )
    .bind(change_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
