//! Product sync: Shopify products straight into `products`.

use shopsync_core::ProductSnapshot;
use shopsync_db::{BatchType, ProductRow};
use shopsync_shopify::{normalize_product, queries::PRODUCTS_QUERY, ProductNode, ShopifyClient};
use sqlx::PgPool;

use crate::batch::{close_batch, fail_batch_best_effort, open_batch};
use crate::reconcile::{reconcile, ReconcileStore};
use crate::report::BatchReport;
use crate::PipelineError;

/// Fetches every product and normalizes it. Products that fail to normalize
/// are recorded as failures on `report` and left out.
///
/// # Errors
///
/// Returns [`PipelineError::Shopify`] if the paginated fetch fails.
pub async fn fetch_product_snapshots(
    client: &ShopifyClient,
    report: &mut BatchReport,
) -> Result<Vec<ProductSnapshot>, PipelineError> {
    let nodes: Vec<ProductNode> = client
        .fetch_all_nodes(PRODUCTS_QUERY, serde_json::json!({}), &["products"])
        .await?;
    tracing::debug!(count = nodes.len(), "fetched products from Shopify");

    let mut snapshots = Vec::with_capacity(nodes.len());
    for node in nodes {
        let id = node.id.clone();
        match normalize_product(node) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                tracing::warn!(
                    shopify_id = %id,
                    error = %e,
                    "skipping product that failed to normalize"
                );
                report.bump("errors");
                report.failure(id, e.to_string());
            }
        }
    }
    Ok(snapshots)
}

/// Products keyed by Shopify numeric id.
struct ProductStore<'a> {
    pool: &'a PgPool,
}

impl ReconcileStore for ProductStore<'_> {
    type Item = ProductSnapshot;
    type Local = ProductRow;

    fn key(item: &ProductSnapshot) -> String {
        item.shopify_id.clone().unwrap_or_else(|| item.handle.clone())
    }

    fn is_current(local: &ProductRow, item: &ProductSnapshot) -> bool {
        local.to_snapshot() == *item
            && local.last_synced_hash.as_deref() == Some(item.content_hash().as_str())
    }

    async fn find(&mut self, item: &ProductSnapshot) -> Result<Option<ProductRow>, PipelineError> {
        let Some(shopify_id) = item.shopify_id.as_deref() else {
            return Ok(None);
        };
        Ok(shopsync_db::get_product_by_shopify_id(self.pool, shopify_id).await?)
    }

    async fn create(&mut self, item: &ProductSnapshot) -> Result<(), PipelineError> {
        let hash = item.content_hash();
        shopsync_db::insert_product(self.pool, item, Some(&hash)).await?;
        Ok(())
    }

    async fn update(
        &mut self,
        local: &ProductRow,
        item: &ProductSnapshot,
    ) -> Result<(), PipelineError> {
        let hash = item.content_hash();
        shopsync_db::update_product(self.pool, local.id, item, Some(&hash)).await?;
        Ok(())
    }
}

/// Mirrors every Shopify product into the local database, overwriting local
/// edits. Synced rows record the content hash they were written with.
///
/// # Errors
///
/// Returns an error if the batch cannot be opened or closed or if the
/// Shopify fetch fails. Per-product failures only show up in the report.
pub async fn sync_products(
    pool: &PgPool,
    client: &ShopifyClient,
    dry_run: bool,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("sync_products", dry_run);
    let batch_id = open_batch(pool, BatchType::SyncProducts, &mut report).await?;

    let snapshots = match fetch_product_snapshots(client, &mut report).await {
        Ok(snapshots) => snapshots,
        Err(e) => {
            fail_batch_best_effort(pool, batch_id, "sync_products", &e.to_string()).await;
            return Err(e);
        }
    };

    let mut store = ProductStore { pool };
    let counts = reconcile(&mut store, &snapshots, dry_run, &mut report).await;
    tracing::info!(
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        errors = counts.errors,
        dry_run,
        "product sync complete"
    );

    close_batch(pool, &mut report).await?;
    Ok(report)
}
