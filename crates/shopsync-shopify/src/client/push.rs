//! Product write-back mutations for `ShopifyClient`.

use serde_json::json;
use shopsync_core::{product_gid, variant_gid, ProductSnapshot};

use crate::error::ShopifyError;
use crate::graphql::UserError;
use crate::queries::{PRODUCT_UPDATE_MUTATION, PRODUCT_VARIANTS_BULK_UPDATE_MUTATION};
use crate::types::{ProductUpdateData, VariantsBulkUpdateData};

use super::ShopifyClient;

fn check_user_errors(operation: &'static str, errors: &[UserError]) -> Result<(), ShopifyError> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(ShopifyError::UserErrors {
        operation,
        messages: errors.iter().map(UserError::describe).collect(),
    })
}

/// `ProductInput` variables for `productUpdate`.
#[must_use]
pub fn product_update_input(shopify_id: &str, product: &ProductSnapshot) -> serde_json::Value {
    json!({
        "input": {
            "id": product_gid(shopify_id),
            "title": product.title,
            "handle": product.handle,
            "descriptionHtml": product.description_html.clone().unwrap_or_default(),
            "vendor": product.vendor.clone().unwrap_or_default(),
            "productType": product.product_type.clone().unwrap_or_default(),
            "status": product.status.to_ascii_uppercase(),
            "tags": product.tags,
        }
    })
}

/// Variables for `productVariantsBulkUpdate` on the default variant, or
/// `None` when the product has no known variant.
#[must_use]
pub fn variant_update_input(
    shopify_id: &str,
    product: &ProductSnapshot,
) -> Option<serde_json::Value> {
    let variant_id = product.default_variant_id.as_deref()?;

    let mut variant = serde_json::Map::new();
    variant.insert("id".to_owned(), variant_gid(variant_id).into());
    if let Some(price) = product.price {
        variant.insert("price".to_owned(), price.to_string().into());
    }
    variant.insert(
        "compareAtPrice".to_owned(),
        product
            .compare_at_price
            .map_or(serde_json::Value::Null, |p| p.to_string().into()),
    );
    if let Some(sku) = &product.sku {
        variant.insert("inventoryItem".to_owned(), json!({ "sku": sku }));
    }

    Some(json!({
        "productId": product_gid(shopify_id),
        "variants": [variant],
    }))
}

impl ShopifyClient {
    /// Writes a local product back to Shopify: product fields through
    /// `productUpdate`, then price, compare-at price and SKU of the default
    /// variant through `productVariantsBulkUpdate`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UserErrors`] if Shopify rejects either
    /// mutation, [`ShopifyError::GraphQL`] for top-level GraphQL errors, and
    /// propagates [`Self::execute`] errors.
    pub async fn push_product(
        &self,
        shopify_id: &str,
        product: &ProductSnapshot,
    ) -> Result<(), ShopifyError> {
        let data = self
            .execute::<ProductUpdateData>(
                PRODUCT_UPDATE_MUTATION,
                product_update_input(shopify_id, product),
                true,
            )
            .await?
            .into_data()?;
        check_user_errors("productUpdate", &data.product_update.user_errors)?;

        if let Some(variables) = variant_update_input(shopify_id, product) {
            let data = self
                .execute::<VariantsBulkUpdateData>(
                    PRODUCT_VARIANTS_BULK_UPDATE_MUTATION,
                    variables,
                    true,
                )
                .await?
                .into_data()?;
            check_user_errors(
                "productVariantsBulkUpdate",
                &data.product_variants_bulk_update.user_errors,
            )?;
        }

        tracing::debug!(shopify_id, handle = %product.handle, "pushed product to Shopify");
        Ok(())
    }
}
