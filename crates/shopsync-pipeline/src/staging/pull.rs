use serde_json::json;
use shopsync_core::{check_auto_approval, ApprovalRule, ChangeType, ProductSnapshot};
use shopsync_db::{BatchType, NewAuditEntry};
use shopsync_shopify::ShopifyClient;
use sqlx::PgPool;
use uuid::Uuid;

use crate::batch::{close_batch, fail_batch_best_effort, open_batch};
use crate::products::fetch_product_snapshots;
use crate::report::BatchReport;
use crate::PipelineError;

use super::plan::plan_change;
use super::review::auto_approve;

#[derive(Debug, Clone, Copy, Default)]
pub struct PullOptions {
    /// Run newly staged changes through the active approval rules.
    pub auto_approve: bool,
    pub dry_run: bool,
}

enum Staged {
    Unchanged,
    Duplicate,
    /// Would have been staged (dry run).
    Planned {
        conflicted: bool,
        change_type: ChangeType,
        fields: usize,
    },
    New {
        conflicted: bool,
        auto_approved: bool,
        superseded: usize,
    },
}

/// Pulls every Shopify product and stages a `pending` change for each one
/// that differs from its local row.
///
/// Nothing in `products` is written. Identical pending changes are not staged
/// twice, and a new change for a product rejects that product's older pending
/// changes as superseded, so at most one change per product awaits review. With `auto_approve`, each new change is checked against the active
/// approval rules and approved on the spot when no rule vetoes it.
///
/// # Errors
///
/// Returns an error if the batch cannot be opened or closed, the rules cannot
/// be loaded, or the Shopify fetch fails. Per-product failures only show up in
/// the report.
pub async fn pull_product_changes(
    pool: &PgPool,
    client: &ShopifyClient,
    options: PullOptions,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("pull", options.dry_run);
    let batch_id = open_batch(pool, BatchType::Pull, &mut report).await?;

    let rules = if options.auto_approve {
        match shopsync_db::list_active_approval_rules(pool).await {
            Ok(rules) => rules,
            Err(e) => {
                fail_batch_best_effort(pool, batch_id, "pull", &e.to_string()).await;
                return Err(e.into());
            }
        }
    } else {
        Vec::new()
    };

    let snapshots = match fetch_product_snapshots(client, &mut report).await {
        Ok(snapshots) => snapshots,
        Err(e) => {
            fail_batch_best_effort(pool, batch_id, "pull", &e.to_string()).await;
            return Err(e);
        }
    };

    for snapshot in &snapshots {
        let key = snapshot
            .shopify_id
            .clone()
            .unwrap_or_else(|| snapshot.handle.clone());
        let staged = stage_one(pool, snapshot, batch_id, options, &rules).await;
        match staged {
            Ok(Staged::Unchanged) => {
                report.bump("unchanged");
                report.skipped(key, None);
            }
            Ok(Staged::Duplicate) => {
                report.bump("duplicates");
                report.skipped(key, Some("identical change already pending".to_owned()));
            }
            Ok(Staged::Planned {
                conflicted,
                change_type,
                fields,
            }) => {
                report.bump("staged");
                if conflicted {
                    report.bump("conflicts");
                }
                let detail = format!("would stage {change_type} of {fields} field(s)");
                report.success(key, Some(detail));
            }
            Ok(Staged::New {
                conflicted,
                auto_approved,
                superseded,
            }) => {
                report.bump("staged");
                if superseded > 0 {
                    report.add("superseded", superseded);
                }
                if conflicted {
                    report.bump("conflicts");
                }
                if auto_approved {
                    report.bump("auto_approved");
                }
                report.success(key, None);
            }
            Err(e) => {
                tracing::warn!(shopify_id = %key, error = %e, "failed to stage product change");
                report.bump("errors");
                report.failure(key, e.to_string());
            }
        }
    }

    tracing::info!(
        staged = report.count("staged"),
        conflicts = report.count("conflicts"),
        duplicates = report.count("duplicates"),
        superseded = report.count("superseded"),
        auto_approved = report.count("auto_approved"),
        dry_run = options.dry_run,
        "pull complete"
    );

    close_batch(pool, &mut report).await?;
    Ok(report)
}

async fn stage_one(
    pool: &PgPool,
    snapshot: &ProductSnapshot,
    batch_id: Option<Uuid>,
    options: PullOptions,
    rules: &[ApprovalRule],
) -> Result<Staged, PipelineError> {
    let local = match snapshot.shopify_id.as_deref() {
        Some(shopify_id) => shopsync_db::get_product_by_shopify_id(pool, shopify_id).await?,
        None => None,
    };

    let Some(change) = plan_change(local.as_ref(), snapshot, batch_id) else {
        return Ok(Staged::Unchanged);
    };
    if options.dry_run {
        return Ok(Staged::Planned {
            conflicted: change.has_conflicts,
            change_type: change.change_type,
            fields: change.field_changes.len(),
        });
    }

    let mut tx = pool.begin().await?;
    let Some(row) = shopsync_db::insert_staged_change(&mut *tx, &change).await? else {
        tracing::debug!(
            shopify_id = ?change.shopify_id,
            target_version = %change.target_version,
            "identical change already pending"
        );
        return Ok(Staged::Duplicate);
    };

    shopsync_db::record_audit(
        &mut *tx,
        &NewAuditEntry {
            entity_type: "product",
            entity_id: row.product_id,
            action: "stage",
            actor: super::PULL_ACTOR,
            change_id: Some(row.change_id),
            batch_id,
            details: json!({
                "change_type": row.change_type,
                "fields": change.field_changes.keys().collect::<Vec<_>>(),
                "has_conflicts": row.has_conflicts,
            }),
        },
    )
    .await?;

    let superseded = match row.shopify_id.as_deref() {
        Some(shopify_id) => {
            shopsync_db::supersede_pending_changes(
                &mut *tx,
                shopify_id,
                row.change_id,
                super::PULL_ACTOR,
            )
            .await?
        }
        None => Vec::new(),
    };
    for old_id in &superseded {
        shopsync_db::record_audit(
            &mut *tx,
            &NewAuditEntry {
                entity_type: "product",
                entity_id: row.product_id,
                action: "supersede",
                actor: super::PULL_ACTOR,
                change_id: Some(*old_id),
                batch_id,
                details: json!({ "superseded_by": row.change_id }),
            },
        )
        .await?;
    }
    tx.commit().await?;

    if !superseded.is_empty() {
        tracing::info!(
            change_id = %row.change_id,
            shopify_id = ?row.shopify_id,
            superseded = superseded.len(),
            "rejected older pending changes for the same product"
        );
    }

    if row.has_conflicts {
        tracing::warn!(
            change_id = %row.change_id,
            shopify_id = ?row.shopify_id,
            "staged change conflicts with local edits"
        );
    }

    let mut auto_approved = false;
    if options.auto_approve && check_auto_approval(&row.view()?, rules) {
        auto_approve(pool, &row).await?;
        auto_approved = true;
    }

    Ok(Staged::New {
        conflicted: row.has_conflicts,
        auto_approved,
        superseded: superseded.len(),
    })
}
