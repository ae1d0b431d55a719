//! Database operations for `collections` and `product_collections`.

use chrono::{DateTime, Utc};
use shopsync_core::{CollectionSnapshot, CollectionType};
use sqlx::{PgConnection, PgExecutor};

use crate::{corrupt, DbError};

/// A row from the `collections` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRow {
    pub id: i64,
    pub shopify_id: String,
    pub handle: String,
    pub title: String,
    pub description_html: Option<String>,
    /// `custom` or `smart`.
    pub collection_type: String,
    pub rules: Option<serde_json::Value>,
    pub sort_order: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionRow {
    /// Snapshot of the row's attributes. Membership is not loaded.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if `collection_type` holds an unknown value.
    pub fn to_snapshot(&self) -> Result<CollectionSnapshot, DbError> {
        let collection_type = self
            .collection_type
            .parse::<CollectionType>()
            .map_err(corrupt("collections"))?;
        Ok(CollectionSnapshot {
            shopify_id: self.shopify_id.clone(),
            handle: self.handle.clone(),
            title: self.title.clone(),
            description_html: self.description_html.clone(),
            collection_type,
            rules: self.rules.clone(),
            sort_order: self.sort_order.clone(),
            product_ids: Vec::new(),
        })
    }
}

/// Looks up a collection by handle.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_collection_by_handle<'e, E>(
    executor: E,
    handle: &str,
) -> Result<Option<CollectionRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CollectionRow>(
        "SELECT id, shopify_id, handle, title, description_html, collection_type, \
                rules, sort_order, created_at, updated_at \
         FROM collections \
         WHERE handle = $1",
    )
    .bind(handle)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Inserts a collection and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_collection<'e, E>(
    executor: E,
    collection: &CollectionSnapshot,
) -> Result<i64, DbError>
where
    E: PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO collections \
             (shopify_id, handle, title, description_html, collection_type, rules, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(&collection.shopify_id)
    .bind(&collection.handle)
    .bind(&collection.title)
    .bind(&collection.description_html)
    .bind(collection.collection_type.as_str())
    .bind(&collection.rules)
    .bind(&collection.sort_order)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Overwrites a collection's attributes.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has this id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_collection<'e, E>(
    executor: E,
    id: i64,
    collection: &CollectionSnapshot,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE collections SET \
             shopify_id       = $2, \
             handle           = $3, \
             title            = $4, \
             description_html = $5, \
             collection_type  = $6, \
             rules            = $7, \
             sort_order       = $8, \
             updated_at       = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&collection.shopify_id)
    .bind(&collection.handle)
    .bind(&collection.title)
    .bind(&collection.description_html)
    .bind(collection.collection_type.as_str())
    .bind(&collection.rules)
    .bind(&collection.sort_order)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Replaces the member list of a collection.
///
/// `product_ids` are internal product ids in display order; their index is
/// stored as `position`. Run this on a transaction connection so readers never
/// see the collection half-emptied.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn replace_collection_products(
    conn: &mut PgConnection,
    collection_id: i64,
    product_ids: &[i64],
) -> Result<u64, DbError> {
    sqlx::query("DELETE FROM product_collections WHERE collection_id = $1")
        .bind(collection_id)
        .execute(&mut *conn)
        .await?;

    if product_ids.is_empty() {
        return Ok(0);
    }

    let positions: Vec<i32> = (0..product_ids.len())
        .map(|i| i32::try_from(i).unwrap_or(i32::MAX))
        .collect();

    let result = sqlx::query(
        "INSERT INTO product_collections (product_id, collection_id, position) \
         SELECT product_id, $1, position \
         FROM UNNEST($2::bigint[], $3::int[]) AS t (product_id, position) \
         ON CONFLICT (product_id, collection_id) DO NOTHING",
    )
    .bind(collection_id)
    .bind(product_ids)
    .bind(&positions)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Internal ids of a collection's products in stored order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_product_ids<'e, E>(
    executor: E,
    collection_id: i64,
) -> Result<Vec<i64>, DbError>
where
    E: PgExecutor<'e>,
{
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT product_id FROM product_collections \
         WHERE collection_id = $1 \
         ORDER BY position, product_id",
    )
    .bind(collection_id)
    .fetch_all(executor)
    .await?;

    Ok(ids)
}
