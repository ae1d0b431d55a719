//! Database operations for `products`.
//!
//! Writes take a [`ProductSnapshot`] and store its normalized form, so the
//! content hash of a row read back equals the hash of the snapshot written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shopsync_core::ProductSnapshot;
use sqlx::PgExecutor;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, shopify_id, handle, title, description_html, vendor, \
     product_type, status, tags, sku, price, compare_at_price, default_variant_id, \
     last_synced_hash, last_synced_at, created_at, updated_at";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    /// Numeric Shopify id; `NULL` for products that only exist locally.
    pub shopify_id: Option<String>,
    pub handle: String,
    pub title: String,
    pub description_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub status: String,
    pub tags: Vec<String>,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub default_variant_id: Option<String>,
    /// Content hash of the data last pulled from or pushed to Shopify.
    pub last_synced_hash: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    #[must_use]
    pub fn to_snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            shopify_id: self.shopify_id.clone(),
            handle: self.handle.clone(),
            title: self.title.clone(),
            description_html: self.description_html.clone(),
            vendor: self.vendor.clone(),
            product_type: self.product_type.clone(),
            status: self.status.clone(),
            tags: self.tags.clone(),
            sku: self.sku.clone(),
            price: self.price,
            compare_at_price: self.compare_at_price,
            default_variant_id: self.default_variant_id.clone(),
        }
        .normalized()
    }

    /// Whether the row was edited locally since its last sync.
    ///
    /// Rows that were never synced count as edited.
    #[must_use]
    pub fn has_local_edits(&self) -> bool {
        self.last_synced_hash.as_deref() != Some(self.to_snapshot().content_hash().as_str())
    }
}

/// Fetches a product by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_product<'e, E>(executor: E, id: i64) -> Result<ProductRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches and row-locks a product for the rest of the enclosing transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_product_for_update<'e, E>(executor: E, id: i64) -> Result<ProductRow, DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)
}

/// Looks up a product by its numeric Shopify id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_shopify_id<'e, E>(
    executor: E,
    shopify_id: &str,
) -> Result<Option<ProductRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE shopify_id = $1"
    ))
    .bind(shopify_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Inserts a product and returns its id.
///
/// When `synced_hash` is set the row is recorded as in sync with Shopify.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate
/// `handle` or `shopify_id`).
pub async fn insert_product<'e, E>(
    executor: E,
    product: &ProductSnapshot,
    synced_hash: Option<&str>,
) -> Result<i64, DbError>
where
    E: PgExecutor<'e>,
{
    let p = product.normalized();
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO products \
             (shopify_id, handle, title, description_html, vendor, product_type, status, \
              tags, sku, price, compare_at_price, default_variant_id, \
              last_synced_hash, last_synced_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                 $13, CASE WHEN $13::text IS NULL THEN NULL ELSE NOW() END) \
         RETURNING id",
    )
    .bind(&p.shopify_id)
    .bind(&p.handle)
    .bind(&p.title)
    .bind(&p.description_html)
    .bind(&p.vendor)
    .bind(&p.product_type)
    .bind(&p.status)
    .bind(&p.tags)
    .bind(&p.sku)
    .bind(p.price)
    .bind(p.compare_at_price)
    .bind(&p.default_variant_id)
    .bind(synced_hash)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Overwrites every content column of a product.
///
/// `synced_hash` of `None` leaves the sync bookkeeping untouched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_product<'e, E>(
    executor: E,
    id: i64,
    product: &ProductSnapshot,
    synced_hash: Option<&str>,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let p = product.normalized();
    let result = sqlx::query(
        "UPDATE products SET \
             shopify_id         = COALESCE($2, shopify_id), \
             handle             = $3, \
             title              = $4, \
             description_html   = $5, \
             vendor             = $6, \
             product_type       = $7, \
             status             = $8, \
             tags               = $9, \
             sku                = $10, \
             price              = $11, \
             compare_at_price   = $12, \
             default_variant_id = COALESCE($13, default_variant_id), \
             last_synced_hash   = COALESCE($14, last_synced_hash), \
             last_synced_at     = CASE WHEN $14::text IS NULL THEN last_synced_at ELSE NOW() END, \
             updated_at         = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&p.shopify_id)
    .bind(&p.handle)
    .bind(&p.title)
    .bind(&p.description_html)
    .bind(&p.vendor)
    .bind(&p.product_type)
    .bind(&p.status)
    .bind(&p.tags)
    .bind(&p.sku)
    .bind(p.price)
    .bind(p.compare_at_price)
    .bind(&p.default_variant_id)
    .bind(synced_hash)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records that a product's current content matches Shopify.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn mark_product_synced<'e, E>(executor: E, id: i64, hash: &str) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE products SET last_synced_hash = $2, last_synced_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(hash)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Deletes a product. Association rows cascade.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the delete fails.
pub async fn delete_product<'e, E>(executor: E, id: i64) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Products that carry a Shopify id, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_linked_products<'e, E>(executor: E) -> Result<Vec<ProductRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE shopify_id IS NOT NULL ORDER BY id"
    ))
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Products with a non-empty SKU, ordered by SKU. `limit` of `None` returns all.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_with_sku<'e, E>(
    executor: E,
    limit: Option<i64>,
) -> Result<Vec<ProductRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE sku IS NOT NULL AND sku <> '' \
         ORDER BY sku, id \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Maps Shopify ids to internal product ids. Unknown ids are absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn product_ids_by_shopify_ids<'e, E>(
    executor: E,
    shopify_ids: &[String],
) -> Result<Vec<(String, i64)>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT shopify_id, id FROM products WHERE shopify_id = ANY($1)",
    )
    .bind(shopify_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
