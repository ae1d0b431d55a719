//! Local SKUs checked against Xorosoft item numbers.

use shopsync_db::BatchType;
use shopsync_xorosoft::XorosoftClient;
use sqlx::PgPool;

use crate::batch::{close_batch, fail_batch_best_effort, open_batch};
use crate::report::BatchReport;
use crate::PipelineError;

/// Looks up each SKU as a Xorosoft item number.
///
/// Known SKUs are successes, with the item status as detail. Unknown SKUs and
/// failed lookups are failures, told apart by their detail and by the
/// `missing` and `errors` counters.
pub async fn check_skus(client: &XorosoftClient, skus: &[String], report: &mut BatchReport) {
    for sku in skus {
        match client.get_product(sku).await {
            Ok(Some(product)) => {
                report.bump("found");
                report.success(sku.clone(), product.item_status);
            }
            Ok(None) => {
                tracing::debug!(sku = %sku, "SKU not found in Xorosoft");
                report.bump("missing");
                report.failure(sku.clone(), "not found in Xorosoft");
            }
            Err(e) => {
                tracing::warn!(sku = %sku, error = %e, "Xorosoft lookup failed");
                report.bump("errors");
                report.failure(sku.clone(), e.to_string());
            }
        }
    }
}

/// Checks the SKUs of up to `limit` local products (all when `None`) against
/// Xorosoft and reports the unknown ones.
///
/// # Errors
///
/// Returns an error if the batch cannot be opened or closed or the products
/// cannot be listed.
pub async fn run_inventory_check(
    pool: &PgPool,
    client: &XorosoftClient,
    limit: Option<i64>,
) -> Result<BatchReport, PipelineError> {
    let mut report = BatchReport::new("inventory_check", false);
    let batch_id = open_batch(pool, BatchType::InventoryCheck, &mut report).await?;

    let products = match shopsync_db::list_products_with_sku(pool, limit).await {
        Ok(products) => products,
        Err(e) => {
            fail_batch_best_effort(pool, batch_id, "inventory_check", &e.to_string()).await;
            return Err(e.into());
        }
    };
    let mut skus: Vec<String> = products.into_iter().filter_map(|p| p.sku).collect();
    skus.dedup();

    check_skus(client, &skus, &mut report).await;
    tracing::info!(
        checked = skus.len(),
        found = report.count("found"),
        missing = report.count("missing"),
        errors = report.count("errors"),
        "inventory check complete"
    );

    close_batch(pool, &mut report).await?;
    Ok(report)
}
