//! Collection sync: collections by handle, then their product memberships.

use shopsync_core::{collection_gid, CollectionSnapshot};
use shopsync_db::{BatchType, CollectionRow};
use shopsync_shopify::{
    normalize_collection,
    queries::{COLLECTIONS_QUERY, COLLECTION_PRODUCTS_QUERY},
    CollectionNode, IdNode, ShopifyClient,
};
use sqlx::PgPool;

use crate::batch::{close_batch, fail_batch_best_effort, open_batch};
use crate::reconcile::{reconcile, ReconcileStore};
use crate::report::BatchReport;
use crate::PipelineError;

struct CollectionStore<'a> {
    pool: &'a PgPool,
}

impl ReconcileStore for CollectionStore<'_> {
    type Item = CollectionSnapshot;
    type Local = CollectionRow;

    fn key(item: &CollectionSnapshot) -> String {
        item.handle.clone()
    }

    fn is_current(local: &CollectionRow, item: &CollectionSnapshot) -> bool {
        local
            .to_snapshot()
            .is_ok_and(|snapshot| snapshot.same_attributes(item))
    }

    async fn find(
        &mut self,
        item: &CollectionSnapshot,
    ) -> Result<Option<CollectionRow>, PipelineError> {
        Ok(shopsync_db::get_collection_by_handle(self.pool, &item.handle).await?)
    }

    async fn create(&mut self, item: &CollectionSnapshot) -> Result<(), PipelineError> {
        shopsync_db::insert_collection(self.pool, item).await?;
        Ok(())
    }

    async fn update(
        &mut self,
        local: &CollectionRow,
        item: &CollectionSnapshot,
    ) -> Result<(), PipelineError> {
        shopsync_db::update_collection(self.pool, local.id, item).await?;
        Ok(())
    }
}

/// Fetches all collections with their member product ids, in collection
/// order.
async fn fetch_collection_snapshots(
    client: &ShopifyClient,
) -> Result<Vec<CollectionSnapshot>, PipelineError> {
    let nodes: Vec<CollectionNode> = client
        .fetch_all_nodes(COLLECTIONS_QUERY, serde_json::json!({}), &["collections"])
        .await?;
    tracing::debug!(count = nodes.len(), "fetched collections from Shopify");

    let mut snapshots = Vec::with_capacity(nodes.len());
    for node in nodes {
        let members: Vec<IdNode> = client
            .fetch_all_nodes(
                COLLECTION_PRODUCTS_QUERY,
                serde_json::json!({ "id": collection_gid(&node.id) }),
                &["collection", "products"],
            )
            .await?;
        let gids: Vec<String> = members.into_iter().map(|m| m.id).collect();
        snapshots.push(normalize_collection(node, &gids));
    }
    Ok(snapshots)
}

/// Replaces one collection's memberships in a single transaction.
///
/// Returns the number of memberships written and the number of member
/// products not present locally.
async fn sync_memberships(
    pool: &PgPool,
    collection: &CollectionSnapshot,
) -> Result<(u64, usize), PipelineError> {
    let mut tx = pool.begin().await?;

    let row = shopsync_db::get_collection_by_handle(&mut *tx, &collection.handle)
        .await?
        .ok_or(shopsync_db::DbError::NotFound)?;

    let known = shopsync_db::product_ids_by_shopify_ids(&mut *tx, &collection.product_ids).await?;
    let ordered: Vec<i64> = collection
        .product_ids
        .iter()
        .filter_map(|sid| known.iter().find(|(k, _)| k == sid).map(|(_, id)| *id))
        .collect();
    let missing = collection.product_ids.len() - ordered.len();

    let written = shopsync_db::replace_collection_products(&mut *tx, row.id, &ordered).await?;
    tx.commit().await?;

    Ok((written, missing))
}

/// Mirrors collections by handle, then replaces each collection's product
/// memberships. Members whose product has not been synced yet are dropped and
/// counted under `missing_products`.
///
/// # Errors
///
/// Returns an error if the batch cannot be opened or closed or if the
/// Shopify fetch fails.
pub async fn sync_collections(
    pool: &PgPool,
    client: &ShopifyClient,
    dry_run: bool,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("sync_collections", dry_run);
    let batch_id = open_batch(pool, BatchType::SyncCollections, &mut report).await?;

    let snapshots = match fetch_collection_snapshots(client).await {
        Ok(snapshots) => snapshots,
        Err(e) => {
            fail_batch_best_effort(pool, batch_id, "sync_collections", &e.to_string()).await;
            return Err(e);
        }
    };

    let mut store = CollectionStore { pool };
    let counts = reconcile(&mut store, &snapshots, dry_run, &mut report).await;

    if !dry_run {
        for collection in &snapshots {
            match sync_memberships(pool, collection).await {
                Ok((written, missing)) => {
                    report.add("memberships", usize::try_from(written).unwrap_or(usize::MAX));
                    if missing > 0 {
                        tracing::warn!(
                            handle = %collection.handle,
                            missing,
                            "collection lists products that are not synced locally"
                        );
                        report.add("missing_products", missing);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        handle = %collection.handle,
                        error = %e,
                        "failed to replace collection memberships"
                    );
                    report.bump("errors");
                    report.failure(format!("{}/products", collection.handle), e.to_string());
                }
            }
        }
    }

    tracing::info!(
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        errors = counts.errors,
        memberships = report.count("memberships"),
        dry_run,
        "collection sync complete"
    );

    close_batch(pool, &mut report).await?;
    Ok(report)
}
