//! Database operations for `staged_product_changes`.
//!
//! Status changes are guarded updates (`WHERE change_id = $1 AND status = $2`):
//! a change that is not in the required predecessor status is left untouched
//! and the call fails with [`DbError::InvalidStagedChangeTransition`]. Review
//! transitions also tell a missing change apart ([`DbError::NotFound`]). Rows
//! are never deleted.

use chrono::{DateTime, Utc};
use shopsync_core::{ChangeStatus, ChangeType, EntityType, FieldChanges, StagedChangeView};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{corrupt, DbError};

const CHANGE_COLUMNS: &str = "id, change_id, batch_id, product_id, shopify_id, change_type, \
     current_data, proposed_data, field_changes, has_conflicts, status, source_version, \
     target_version, auto_approved, reviewed_by, reviewed_at, review_note, applied_by, \
     applied_at, applied_version_id, rolled_back_by, rolled_back_at, created_at, updated_at";

/// A row from the `staged_product_changes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StagedChangeRow {
    pub id: i64,
    pub change_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub product_id: Option<i64>,
    pub shopify_id: Option<String>,
    pub change_type: String,
    pub current_data: Option<serde_json::Value>,
    pub proposed_data: serde_json::Value,
    pub field_changes: serde_json::Value,
    pub has_conflicts: bool,
    pub status: String,
    pub source_version: Option<String>,
    pub target_version: String,
    pub auto_approved: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    pub applied_by: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_version_id: Option<i64>,
    pub rolled_back_by: Option<String>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedChangeRow {
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the stored status is unknown.
    pub fn status(&self) -> Result<ChangeStatus, DbError> {
        self.status
            .parse()
            .map_err(corrupt("staged_product_changes"))
    }

    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the stored change type is unknown.
    pub fn change_type(&self) -> Result<ChangeType, DbError> {
        self.change_type
            .parse()
            .map_err(corrupt("staged_product_changes"))
    }

    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if `field_changes` is not a diff map.
    pub fn field_changes(&self) -> Result<FieldChanges, DbError> {
        serde_json::from_value(self.field_changes.clone()).map_err(|source| DbError::Corrupt {
            table: "staged_product_changes",
            source: shopsync_core::CoreError::Snapshot {
                entity: "field changes",
                source,
            },
        })
    }

    /// The subset approval rules evaluate.
    ///
    /// # Errors
    ///
    /// Same as [`Self::change_type`] and [`Self::field_changes`].
    pub fn view(&self) -> Result<StagedChangeView, DbError> {
        Ok(StagedChangeView {
            entity_type: EntityType::Product,
            change_type: self.change_type()?,
            field_changes: self.field_changes()?,
            has_conflicts: self.has_conflicts,
        })
    }
}

/// Values for a new `pending` change.
#[derive(Debug, Clone)]
pub struct NewStagedChange {
    pub batch_id: Option<Uuid>,
    pub product_id: Option<i64>,
    pub shopify_id: Option<String>,
    pub change_type: ChangeType,
    pub current_data: Option<serde_json::Value>,
    pub proposed_data: serde_json::Value,
    pub field_changes: FieldChanges,
    pub has_conflicts: bool,
    pub source_version: Option<String>,
    pub target_version: String,
}

fn guard_failed(change_id: Uuid, next: ChangeStatus) -> DbError {
    DbError::InvalidStagedChangeTransition {
        change_id,
        expected_status: ChangeStatus::required_predecessor(next)
            .map_or("none", ChangeStatus::as_str),
    }
}

/// Interprets a review update that reports whether it touched a row and
/// whether the change exists at all.
fn review_outcome(
    change_id: Uuid,
    next: ChangeStatus,
    (updated, found): (bool, bool),
) -> Result<(), DbError> {
    match (updated, found) {
        (true, _) => Ok(()),
        (false, false) => Err(DbError::NotFound),
        (false, true) => Err(guard_failed(change_id, next)),
    }
}

/// Inserts a `pending` change with a fresh `change_id`.
///
/// Returns `None` when an identical change (same `shopify_id` and
/// `target_version`) is already pending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_staged_change<'e, E>(
    executor: E,
    change: &NewStagedChange,
) -> Result<Option<StagedChangeRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let field_changes = serde_json::to_value(&change.field_changes).map_err(|source| {
        DbError::Corrupt {
            table: "staged_product_changes",
            source: shopsync_core::CoreError::Snapshot {
                entity: "field changes",
                source,
            },
        }
    })?;

    let row = sqlx::query_as::<_, StagedChangeRow>(&format!(
        "INSERT INTO staged_product_changes \
             (change_id, batch_id, product_id, shopify_id, change_type, current_data, \
              proposed_data, field_changes, has_conflicts, status, source_version, \
              target_version) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11) \
         ON CONFLICT (shopify_id, target_version) WHERE status = 'pending' DO NOTHING \
         RETURNING {CHANGE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(change.batch_id)
    .bind(change.product_id)
    .bind(&change.shopify_id)
    .bind(change.change_type.as_str())
    .bind(&change.current_data)
    .bind(&change.proposed_data)
    .bind(field_changes)
    .bind(change.has_conflicts)
    .bind(&change.source_version)
    .bind(&change.target_version)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no change has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_staged_change<'e, E>(
    executor: E,
    change_id: Uuid,
) -> Result<StagedChangeRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, StagedChangeRow>(&format!(
        "SELECT {CHANGE_COLUMNS} FROM staged_product_changes WHERE change_id = $1"
    ))
    .bind(change_id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches and row-locks a change for the rest of the enclosing transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no change has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_staged_change_for_update<'e, E>(
    executor: E,
    change_id: Uuid,
) -> Result<StagedChangeRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, StagedChangeRow>(&format!(
        "SELECT {CHANGE_COLUMNS} FROM staged_product_changes WHERE change_id = $1 FOR UPDATE"
    ))
    .bind(change_id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Changes oldest first, optionally filtered by status. This is the order
/// changes are applied in.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_staged_changes<'e, E>(
    executor: E,
    status: Option<ChangeStatus>,
    limit: Option<i64>,
) -> Result<Vec<StagedChangeRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, StagedChangeRow>(&format!(
        "SELECT {CHANGE_COLUMNS} FROM staged_product_changes \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at, id \
         LIMIT $2"
    ))
    .bind(status.map(ChangeStatus::as_str))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// The `limit` most recently staged changes, newest first, optionally
/// filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_staged_changes<'e, E>(
    executor: E,
    status: Option<ChangeStatus>,
    limit: i64,
) -> Result<Vec<StagedChangeRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, StagedChangeRow>(&format!(
        "SELECT {CHANGE_COLUMNS} FROM staged_product_changes \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(status.map(ChangeStatus::as_str))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Rejects every other `pending` change for `shopify_id`, noting `newer` as
/// the change that replaced it. Returns the ids that were rejected, oldest
/// first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn supersede_pending_changes<'e, E>(
    executor: E,
    shopify_id: &str,
    newer: Uuid,
    actor: &str,
) -> Result<Vec<Uuid>, DbError>
where
    E: PgExecutor<'e>,
{
    let mut superseded = sqlx::query_as::<_, (Uuid, i64)>(
        "UPDATE staged_product_changes SET \
             status = 'rejected', reviewed_by = $4, reviewed_at = NOW(), \
             review_note = 'superseded by ' || $2::text, updated_at = NOW() \
         WHERE shopify_id = $1 AND status = $3 AND change_id <> $2 \
         RETURNING change_id, id",
    )
    .bind(shopify_id)
    .bind(newer)
    .bind(ChangeStatus::Pending.as_str())
    .bind(actor)
    .fetch_all(executor)
    .await?;

    superseded.sort_by_key(|(_, id)| *id);
    Ok(superseded.into_iter().map(|(change_id, _)| change_id).collect())
}

/// `pending → approved`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no change has this id,
/// [`DbError::InvalidStagedChangeTransition`] if it is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn approve_staged_change<'e, E>(
    executor: E,
    change_id: Uuid,
    reviewer: &str,
    note: Option<&str>,
    auto_approved: bool,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let outcome = sqlx::query_as::<_, (bool, bool)>(
        "WITH updated AS ( \
             UPDATE staged_product_changes SET \
                 status = 'approved', reviewed_by = $3, reviewed_at = NOW(), \
                 review_note = $4, auto_approved = $5, updated_at = NOW() \
             WHERE change_id = $1 AND status = $2 \
             RETURNING 1 \
         ) \
         SELECT EXISTS (SELECT 1 FROM updated), \
                EXISTS (SELECT 1 FROM staged_product_changes WHERE change_id = $1)",
    )
    .bind(change_id)
    .bind(ChangeStatus::Pending.as_str())
    .bind(reviewer)
    .bind(note)
    .bind(auto_approved)
    .fetch_one(executor)
    .await?;

    review_outcome(change_id, ChangeStatus::Approved, outcome)
}

/// `pending → rejected`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no change has this id,
/// [`DbError::InvalidStagedChangeTransition`] if it is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn reject_staged_change<'e, E>(
    executor: E,
    change_id: Uuid,
    reviewer: &str,
    note: Option<&str>,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let outcome = sqlx::query_as::<_, (bool, bool)>(
        "WITH updated AS ( \
             UPDATE staged_product_changes SET \
                 status = 'rejected', reviewed_by = $3, reviewed_at = NOW(), \
                 review_note = $4, updated_at = NOW() \
             WHERE change_id = $1 AND status = $2 \
             RETURNING 1 \
         ) \
         SELECT EXISTS (SELECT 1 FROM updated), \
                EXISTS (SELECT 1 FROM staged_product_changes WHERE change_id = $1)",
    )
    .bind(change_id)
    .bind(ChangeStatus::Pending.as_str())
    .bind(reviewer)
    .bind(note)
    .fetch_one(executor)
    .await?;

    review_outcome(change_id, ChangeStatus::Rejected, outcome)
}

/// `approved → applied`, recording the product the change landed on and the
/// version written at apply time.
///
/// # Errors
///
/// Returns [`DbError::InvalidStagedChangeTransition`] if the change is not
/// approved, or [`DbError::Sqlx`] if the update fails.
pub async fn mark_staged_change_applied<'e, E>(
    executor: E,
    change_id: Uuid,
    product_id: i64,
    applied_version_id: i64,
    actor: &str,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE staged_product_changes SET \
             status = 'applied', product_id = $3, applied_version_id = $4, \
             applied_by = $5, applied_at = NOW(), updated_at = NOW() \
         WHERE change_id = $1 AND status = $2",
    )
    .bind(change_id)
    .bind(ChangeStatus::Approved.as_str())
    .bind(product_id)
    .bind(applied_version_id)
    .bind(actor)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(guard_failed(change_id, ChangeStatus::Applied));
    }
    Ok(())
}

/// `applied → rolled_back`.
///
/// # Errors
///
/// Returns [`DbError::InvalidStagedChangeTransition`] if the change is not
/// applied, or [`DbError::Sqlx`] if the update fails.
pub async fn mark_staged_change_rolled_back<'e, E>(
    executor: E,
    change_id: Uuid,
    actor: &str,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE staged_product_changes SET \
             status = 'rolled_back', rolled_back_by = $3, rolled_back_at = NOW(), \
             updated_at = NOW() \
         WHERE change_id = $1 AND status = $2",
    )
    .bind(change_id)
    .bind(ChangeStatus::Applied.as_str())
    .bind(actor)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(guard_failed(change_id, ChangeStatus::RolledBack));
    }
    Ok(())
}
