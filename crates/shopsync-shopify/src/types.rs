//! Admin GraphQL node shapes, matching the selections in [`crate::queries`].
//!
//! ## Observed shapes
//!
//! ### `status`
//! An uppercase enum: `ACTIVE`, `DRAFT` or `ARCHIVED`. Snapshots store it
//! lowercase.
//!
//! ### `price` / `compareAtPrice`
//! `Money` scalars serialized as decimal strings (`"34.00"`).
//! `compareAtPrice` is `null` when the variant is not on sale.
//!
//! ### `descriptionHtml`, `vendor`, `productType`
//! Always present but frequently the empty string; treated as absent.
//!
//! ### `ruleSet`
//! `null` for custom (manual) collections.

use serde::Deserialize;

use crate::graphql::Edge;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    /// Global ID, e.g. `gid://shopify/Product/8123456789`.
    pub id: String,
    pub handle: String,
    pub title: String,
    #[serde(default)]
    pub description_html: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variants: Option<VariantEdges>,
}

impl ProductNode {
    /// The first (default) variant, if the selection returned one.
    #[must_use]
    pub fn default_variant(&self) -> Option<&VariantNode> {
        self.variants.as_ref()?.edges.first().map(|e| &e.node)
    }
}

#[derive(Debug, Deserialize)]
pub struct VariantEdges {
    pub edges: Vec<Edge<VariantNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantNode {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub compare_at_price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionNode {
    pub id: String,
    pub handle: String,
    pub title: String,
    #[serde(default)]
    pub description_html: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub rule_set: Option<serde_json::Value>,
}

/// A node selected only for its ID.
#[derive(Debug, Deserialize)]
pub struct IdNode {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MutationPayload {
    #[serde(default)]
    pub user_errors: Vec<crate::graphql::UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductUpdateData {
    pub product_update: MutationPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VariantsBulkUpdateData {
    pub product_variants_bulk_update: MutationPayload,
}
