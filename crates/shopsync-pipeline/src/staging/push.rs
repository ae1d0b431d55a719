use futures::stream::{self, StreamExt};
use shopsync_core::{validate_product_for_push, ProductSnapshot};
use shopsync_db::{BatchType, ProductRow};
use shopsync_shopify::ShopifyClient;
use sqlx::PgPool;

use crate::batch::{close_batch, fail_batch_best_effort, open_batch};
use crate::report::BatchReport;
use crate::PipelineError;

struct Candidate {
    product_id: i64,
    shopify_id: String,
    snapshot: ProductSnapshot,
}

/// Linked products edited since their last sync, with the ones that fail
/// validation split off.
fn select_candidates(products: Vec<ProductRow>, report: &mut BatchReport) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for row in products.into_iter().filter(ProductRow::has_local_edits) {
        let Some(shopify_id) = row.shopify_id.clone() else {
            continue;
        };
        let snapshot = row.to_snapshot();
        if let Err(errors) = validate_product_for_push(&snapshot) {
            let err = PipelineError::Validation {
                handle: snapshot.handle.clone(),
                errors,
            };
            tracing::warn!(product_id = row.id, error = %err, "product not pushed");
            report.bump("invalid");
            report.failure(snapshot.handle, err.to_string());
            continue;
        }
        candidates.push(Candidate {
            product_id: row.id,
            shopify_id,
            snapshot,
        });
    }
    candidates
}

async fn push_one(
    pool: &PgPool,
    client: &ShopifyClient,
    candidate: &Candidate,
) -> Result<(), PipelineError> {
    client
        .push_product(&candidate.shopify_id, &candidate.snapshot)
        .await?;
    shopsync_db::mark_product_synced(
        pool,
        candidate.product_id,
        &candidate.snapshot.content_hash(),
    )
    .await?;
    Ok(())
}

/// Pushes every locally edited, Shopify-linked product back to Shopify and
/// marks it in sync.
///
/// Products are validated first; invalid ones are reported and never sent.
/// Up to `max_workers` pushes run at once (at least one), all sharing the
/// client's rate limiter.
///
/// # Errors
///
/// Returns an error if the batch cannot be opened or closed or the products
/// cannot be listed. Per-product failures only show up in the report.
pub async fn push_product_changes(
    pool: &PgPool,
    client: &ShopifyClient,
    dry_run: bool,
    max_workers: usize,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("push", dry_run);
    let batch_id = open_batch(pool, BatchType::Push, &mut report).await?;

    let products = match shopsync_db::list_linked_products(pool).await {
        Ok(products) => products,
        Err(e) => {
            fail_batch_best_effort(pool, batch_id, "push", &e.to_string()).await;
            return Err(e.into());
        }
    };
    let candidates = select_candidates(products, &mut report);
    tracing::info!(count = candidates.len(), max_workers, dry_run, "pushing local edits");

    if dry_run {
        for candidate in &candidates {
            report.bump("pushed");
            report.success(candidate.snapshot.handle.clone(), Some("would push".to_owned()));
        }
        close_batch(pool, &mut report).await?;
        return Ok(report);
    }

    let results: Vec<(&Candidate, Result<(), PipelineError>)> = stream::iter(&candidates)
        .map(|candidate| async move { (candidate, push_one(pool, client, candidate).await) })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await;

    for (candidate, result) in results {
        let handle = candidate.snapshot.handle.clone();
        match result {
            Ok(()) => {
                report.bump("pushed");
                report.success(handle, None);
            }
            Err(e) => {
                tracing::warn!(
                    product_id = candidate.product_id,
                    shopify_id = %candidate.shopify_id,
                    error = %e,
                    "failed to push product"
                );
                report.bump("errors");
                report.failure(handle, e.to_string());
            }
        }
    }

    close_batch(pool, &mut report).await?;
    Ok(report)
}
