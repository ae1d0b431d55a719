use serde::Serialize;
use serde_json::json;
use shopsync_core::{apply_proposed_fields, ChangeStatus, ChangeType, EntityType, ProductSnapshot};
use shopsync_db::{BatchType, NewAuditEntry, StagedChangeRow};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::batch::{close_batch, open_batch};
use crate::report::BatchReport;
use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    pub change_id: Uuid,
    pub product_id: i64,
    /// `sync_versions.id` of the snapshot taken at apply time.
    pub version_id: i64,
}

fn inconsistent(change_id: Uuid, reason: &str) -> PipelineError {
    PipelineError::Inconsistent {
        change_id,
        reason: reason.to_owned(),
    }
}

fn stale(change_id: Uuid, reason: impl Into<String>) -> PipelineError {
    PipelineError::Stale {
        change_id,
        reason: reason.into(),
    }
}

fn snapshot_json(snapshot: &ProductSnapshot) -> serde_json::Value {
    serde_json::Value::Object(snapshot.to_json_map())
}

/// Applies an approved change to `products` in one transaction.
///
/// For an `update` the locked product must still hash to the change's
/// `source_version`; it is then snapshotted into a new version and the
/// proposed fields are written over it. A `create` inserts the product and
/// records its first version, provided no product with that Shopify id exists
/// yet. The product is marked in sync with the applied content.
///
/// # Errors
///
/// Returns [`PipelineError::Core`] if the change is not approved,
/// [`PipelineError::Stale`] if the product moved since the change was staged,
/// [`PipelineError::Inconsistent`] if an update change has no product, and
/// database errors. Nothing is written on error.
pub async fn apply_change(
    pool: &PgPool,
    change_id: Uuid,
    actor: &str,
) -> Result<AppliedChange, PipelineError> {
    let mut tx = pool.begin().await?;

    let change = shopsync_db::get_staged_change_for_update(&mut *tx, change_id).await?;
    change.status()?.transition(ChangeStatus::Applied)?;

    let (product_id, version) = match change.change_type()? {
        ChangeType::Update => apply_update(&mut tx, &change, actor).await?,
        ChangeType::Create => apply_create(&mut tx, &change, actor).await?,
    };

    shopsync_db::mark_staged_change_applied(&mut *tx, change_id, product_id, version.id, actor)
        .await?;
    shopsync_db::record_audit(
        &mut *tx,
        &NewAuditEntry {
            entity_type: EntityType::Product.as_str(),
            entity_id: Some(product_id),
            action: "apply",
            actor,
            change_id: Some(change_id),
            batch_id: change.batch_id,
            details: json!({
                "change_type": change.change_type,
                "version_number": version.version_number,
                "target_version": change.target_version,
            }),
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(change_id = %change_id, product_id, actor, "applied staged change");

    Ok(AppliedChange {
        change_id,
        product_id,
        version_id: version.id,
    })
}

async fn apply_update(
    conn: &mut PgConnection,
    change: &StagedChangeRow,
    actor: &str,
) -> Result<(i64, shopsync_db::SyncVersionRow), PipelineError> {
    let product_id = change
        .product_id
        .ok_or_else(|| inconsistent(change.change_id, "update change has no product"))?;
    let product = shopsync_db::get_product_for_update(&mut *conn, product_id).await?;
    let current = product.to_snapshot();
    let current_hash = current.content_hash();
    if let Some(expected) = change.source_version.as_deref() {
        if expected != current_hash {
            return Err(stale(
                change.change_id,
                format!("product {product_id} changed since the change was staged"),
            ));
        }
    }

    let version = shopsync_db::record_sync_version(
        &mut *conn,
        EntityType::Product,
        product_id,
        &current_hash,
        &snapshot_json(&current),
        Some(change.change_id),
        actor,
    )
    .await?;

    let merged = apply_proposed_fields(Some(&current), &change.proposed_data)?;
    shopsync_db::update_product(&mut *conn, product_id, &merged, Some(&merged.content_hash()))
        .await?;

    Ok((product_id, version))
}

async fn apply_create(
    conn: &mut PgConnection,
    change: &StagedChangeRow,
    actor: &str,
) -> Result<(i64, shopsync_db::SyncVersionRow), PipelineError> {
    let product = apply_proposed_fields(None, &change.proposed_data)?;
    if let Some(shopify_id) = change.shopify_id.as_deref() {
        let existing = shopsync_db::get_product_by_shopify_id(&mut *conn, shopify_id).await?;
        if let Some(existing) = existing {
            return Err(stale(
                change.change_id,
                format!("product {} already has shopify id {shopify_id}", existing.id),
            ));
        }
    }
    let hash = product.content_hash();
    let product_id = shopsync_db::insert_product(&mut *conn, &product, Some(&hash)).await?;

    let version = shopsync_db::record_sync_version(
        &mut *conn,
        EntityType::Product,
        product_id,
        &hash,
        &snapshot_json(&product),
        Some(change.change_id),
        actor,
    )
    .await?;

    Ok((product_id, version))
}

/// Applies every approved change, oldest first, each in its own
/// transaction. A failing change is logged and reported and the rest still
/// run. Stale changes are left approved and reported as skipped.
///
/// # Errors
///
/// Returns an error only if the batch cannot be opened or closed or the
/// approved changes cannot be listed.
pub async fn apply_approved_changes(
    pool: &PgPool,
    actor: &str,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("apply", false);
    open_batch(pool, BatchType::Apply, &mut report).await?;

    let approved =
        shopsync_db::list_staged_changes(pool, Some(ChangeStatus::Approved), None).await?;
    tracing::info!(count = approved.len(), "applying approved changes");

    for change in &approved {
        match apply_change(pool, change.change_id, actor).await {
            Ok(applied) => {
                report.bump("applied");
                report.success(
                    change.change_id.to_string(),
                    Some(format!("product {}", applied.product_id)),
                );
            }
            Err(e @ PipelineError::Stale { .. }) => {
                tracing::warn!(change_id = %change.change_id, error = %e, "skipping stale change");
                report.bump("stale");
                report.skipped(change.change_id.to_string(), Some(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(
                    change_id = %change.change_id,
                    error = %e,
                    "failed to apply staged change"
                );
                report.bump("errors");
                report.failure(change.change_id.to_string(), e.to_string());
            }
        }
    }

    close_batch(pool, &mut report).await?;
    Ok(report)
}

/// Undoes an applied change in one transaction.
///
/// For an `update` the product's pre-rollback state is kept as a new version
/// and the snapshot recorded at apply time is written back verbatim. The sync
/// hash is left alone, so the restored row reads as a local edit until the
/// next push or sync. For a `create` the inserted product is deleted.
///
/// # Errors
///
/// Returns [`PipelineError::Core`] if the change is not applied,
/// [`PipelineError::Inconsistent`] if the product or version it points to is
/// missing, and database errors. Nothing is written on error.
pub async fn rollback_change(
    pool: &PgPool,
    change_id: Uuid,
    actor: &str,
) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await?;

    let change = shopsync_db::get_staged_change_for_update(&mut *tx, change_id).await?;
    change.status()?.transition(ChangeStatus::RolledBack)?;

    let product_id = change
        .product_id
        .ok_or_else(|| inconsistent(change_id, "applied change has no product"))?;
    let change_type = change.change_type()?;

    match change_type {
        ChangeType::Update => {
            let version_id = change
                .applied_version_id
                .ok_or_else(|| inconsistent(change_id, "applied change has no version"))?;
            let product = match shopsync_db::get_product_for_update(&mut *tx, product_id).await {
                Err(shopsync_db::DbError::NotFound) => {
                    return Err(inconsistent(change_id, "product was deleted after apply"));
                }
                other => other?,
            };
            let current = product.to_snapshot();
            shopsync_db::record_sync_version(
                &mut *tx,
                EntityType::Product,
                product_id,
                &current.content_hash(),
                &snapshot_json(&current),
                Some(change_id),
                actor,
            )
            .await?;

            let version = shopsync_db::get_sync_version(&mut *tx, version_id).await?;
            let restored = ProductSnapshot::from_json(&version.data_snapshot)?;
            shopsync_db::update_product(&mut *tx, product_id, &restored, None).await?;
        }
        ChangeType::Create => match shopsync_db::delete_product(&mut *tx, product_id).await {
            Ok(()) | Err(shopsync_db::DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        },
    }

    shopsync_db::mark_staged_change_rolled_back(&mut *tx, change_id, actor).await?;
    shopsync_db::record_audit(
        &mut *tx,
        &NewAuditEntry {
            entity_type: EntityType::Product.as_str(),
            entity_id: Some(product_id),
            action: "rollback",
            actor,
            change_id: Some(change_id),
            batch_id: change.batch_id,
            details: json!({ "change_type": change_type.as_str() }),
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(change_id = %change_id, product_id, actor, "rolled back staged change");
    Ok(())
}
