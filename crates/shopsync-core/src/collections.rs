use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Shopify collection kind. Smart collections carry a rule set; their product
/// membership is computed by Shopify and only mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Custom,
    Smart,
}

impl CollectionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionType::Custom => "custom",
            CollectionType::Smart => "smart",
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollectionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom" => Ok(CollectionType::Custom),
            "smart" => Ok(CollectionType::Smart),
            other => Err(CoreError::UnknownVariant {
                kind: "collection type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub shopify_id: String,
    pub handle: String,
    pub title: String,
    pub description_html: Option<String>,
    pub collection_type: CollectionType,
    /// Raw `ruleSet` object for smart collections.
    pub rules: Option<serde_json::Value>,
    pub sort_order: Option<String>,
    /// Shopify numeric IDs of member products, in collection order.
    #[serde(default)]
    pub product_ids: Vec<String>,
}

impl CollectionSnapshot {
    /// Equality on collection attributes only; membership is reconciled
    /// separately.
    #[must_use]
    pub fn same_attributes(&self, other: &CollectionSnapshot) -> bool {
        self.shopify_id == other.shopify_id
            && self.handle == other.handle
            && self.title == other.title
            && self.description_html == other.description_html
            && self.collection_type == other.collection_type
            && self.rules == other.rules
            && self.sort_order == other.sort_order
    }
}
