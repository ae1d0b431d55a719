//! Conversion from Admin GraphQL nodes to [`shopsync_core`] snapshots.

use std::str::FromStr;

use rust_decimal::Decimal;
use shopsync_core::{extract_numeric_id, CollectionSnapshot, CollectionType, ProductSnapshot};

use crate::error::ShopifyError;
use crate::types::{CollectionNode, ProductNode};

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_money(
    raw: Option<&str>,
    field: &str,
    product_id: &str,
) -> Result<Option<Decimal>, ShopifyError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    Decimal::from_str(raw)
        .map(Some)
        .map_err(|e| ShopifyError::Normalization {
            entity: "product",
            id: product_id.to_owned(),
            reason: format!("{field} '{raw}' is not a decimal: {e}"),
        })
}

/// Normalizes a [`ProductNode`] into a [`ProductSnapshot`].
///
/// SKU and prices come from the first variant; a product without variants
/// yields `None` for all three.
///
/// # Errors
///
/// Returns [`ShopifyError::Normalization`] if a price is not a decimal.
pub fn normalize_product(node: ProductNode) -> Result<ProductSnapshot, ShopifyError> {
    let shopify_id = extract_numeric_id(&node.id).to_owned();

    let (sku, price, compare_at_price, default_variant_id) = match node.default_variant() {
        Some(variant) => (
            non_empty(variant.sku.clone()),
            parse_money(variant.price.as_deref(), "price", &shopify_id)?,
            parse_money(
                variant.compare_at_price.as_deref(),
                "compareAtPrice",
                &shopify_id,
            )?,
            Some(extract_numeric_id(&variant.id).to_owned()),
        ),
        None => (None, None, None, None),
    };

    let snapshot = ProductSnapshot {
        shopify_id: Some(shopify_id),
        handle: node.handle,
        title: node.title,
        description_html: non_empty(node.description_html),
        vendor: non_empty(node.vendor),
        product_type: non_empty(node.product_type),
        status: node.status.to_ascii_lowercase(),
        tags: node.tags,
        sku,
        price,
        compare_at_price,
        default_variant_id,
    };

    Ok(snapshot.normalized())
}

/// Normalizes a [`CollectionNode`] plus its member product global IDs.
#[must_use]
pub fn normalize_collection(node: CollectionNode, product_gids: &[String]) -> CollectionSnapshot {
    let collection_type = if node.rule_set.as_ref().is_some_and(|r| !r.is_null()) {
        CollectionType::Smart
    } else {
        CollectionType::Custom
    };

    CollectionSnapshot {
        shopify_id: extract_numeric_id(&node.id).to_owned(),
        handle: node.handle,
        title: node.title,
        description_html: non_empty(node.description_html),
        collection_type,
        rules: node.rule_set.filter(|r| !r.is_null()),
        sort_order: non_empty(node.sort_order),
        product_ids: product_gids
            .iter()
            .map(|gid| extract_numeric_id(gid).to_owned())
            .collect(),
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
