use serde_json::json;
use shopsync_db::{NewAuditEntry, StagedChangeRow};
use sqlx::PgPool;
use uuid::Uuid;

use crate::PipelineError;

use super::AUTO_APPROVER;

/// `pending → approved`, audited.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] wrapping
/// [`shopsync_db::DbError::InvalidStagedChangeTransition`] when the change is
/// not pending.
pub async fn approve_change(
    pool: &PgPool,
    change_id: Uuid,
    reviewer: &str,
    note: Option<&str>,
) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await?;
    shopsync_db::approve_staged_change(&mut *tx, change_id, reviewer, note, false).await?;
    audit_review(&mut tx, change_id, "approve", reviewer, note).await?;
    tx.commit().await?;
    tracing::info!(change_id = %change_id, reviewer, "approved staged change");
    Ok(())
}

/// `pending → rejected`, audited.
///
/// # Errors
///
/// Same as [`approve_change`].
pub async fn reject_change(
    pool: &PgPool,
    change_id: Uuid,
    reviewer: &str,
    note: Option<&str>,
) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await?;
    shopsync_db::reject_staged_change(&mut *tx, change_id, reviewer, note).await?;
    audit_review(&mut tx, change_id, "reject", reviewer, note).await?;
    tx.commit().await?;
    tracing::info!(change_id = %change_id, reviewer, "rejected staged change");
    Ok(())
}

/// Approval granted by the rule engine rather than a reviewer.
pub(crate) async fn auto_approve(
    pool: &PgPool,
    change: &StagedChangeRow,
) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await?;
    shopsync_db::approve_staged_change(&mut *tx, change.change_id, AUTO_APPROVER, None, true)
        .await?;
    shopsync_db::record_audit(
        &mut *tx,
        &NewAuditEntry {
            entity_type: "product",
            entity_id: change.product_id,
            action: "auto_approve",
            actor: AUTO_APPROVER,
            change_id: Some(change.change_id),
            batch_id: change.batch_id,
            details: json!({}),
        },
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

async fn audit_review(
    conn: &mut sqlx::PgConnection,
    change_id: Uuid,
    action: &str,
    reviewer: &str,
    note: Option<&str>,
) -> Result<(), PipelineError> {
    let change = shopsync_db::get_staged_change(&mut *conn, change_id).await?;
    shopsync_db::record_audit(
        &mut *conn,
        &NewAuditEntry {
            entity_type: "product",
            entity_id: change.product_id,
            action,
            actor: reviewer,
            change_id: Some(change_id),
            batch_id: change.batch_id,
            details: json!({ "note": note }),
        },
    )
    .await?;
    Ok(())
}
