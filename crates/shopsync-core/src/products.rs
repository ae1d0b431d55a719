use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::versioning::version_hash;
use crate::CoreError;

/// Fields covered by a product's content hash.
///
/// These are the fields a staged change may propose and a rollback restores.
/// Identifiers (`shopify_id`, `default_variant_id`) are deliberately outside
/// the set: they never change once assigned.
pub const VERSIONED_PRODUCT_FIELDS: &[&str] = &[
    "title",
    "handle",
    "description_html",
    "vendor",
    "product_type",
    "status",
    "tags",
    "sku",
    "price",
    "compare_at_price",
];

/// A product as exchanged between Shopify and the local database.
///
/// Both sides are converted into this shape before comparison, so equality
/// and hashing are defined on the same representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Shopify numeric product ID; `None` for products that only exist locally.
    pub shopify_id: Option<String>,
    pub handle: String,
    pub title: String,
    pub description_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    /// Lowercase Shopify status: `"active"`, `"draft"` or `"archived"`.
    pub status: String,
    pub tags: Vec<String>,
    /// SKU of the default (first) variant.
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    /// Numeric ID of the default variant, needed to push price and SKU edits.
    pub default_variant_id: Option<String>,
}

impl ProductSnapshot {
    /// Returns a copy with tags sorted and de-duplicated and decimals stripped
    /// of trailing zeros, so `"12.90"` and `"12.9"` hash identically.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        Self {
            tags,
            status: self.status.to_ascii_lowercase(),
            price: self.price.map(|p| p.normalize()),
            compare_at_price: self.compare_at_price.map(|p| p.normalize()),
            ..self.clone()
        }
    }

    /// Full JSON object form, used for `current_data` / `proposed_data`.
    #[must_use]
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self.normalized()) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// JSON object restricted to [`VERSIONED_PRODUCT_FIELDS`].
    #[must_use]
    pub fn versioned_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut full = self.to_json_map();
        full.retain(|k, _| VERSIONED_PRODUCT_FIELDS.contains(&k.as_str()));
        full
    }

    /// SHA-256 content hash over the versioned field subset.
    #[must_use]
    pub fn content_hash(&self) -> String {
        version_hash(&self.versioned_fields())
    }

    /// Decodes a snapshot previously produced by [`Self::to_json_map`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Snapshot`] if the value does not have the
    /// snapshot shape.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(value.clone()).map_err(|source| CoreError::Snapshot {
            entity: "product",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            shopify_id: Some("8123456789".to_string()),
            handle: "linen-apron".to_string(),
            title: "Linen Apron".to_string(),
            description_html: Some("<p>Stonewashed linen.</p>".to_string()),
            vendor: Some("Acme Goods".to_string()),
            product_type: Some("Apron".to_string()),
            status: "active".to_string(),
            tags: vec!["linen".to_string(), "kitchen".to_string()],
            sku: Some("APR-001".to_string()),
            price: Some(Decimal::from_str("34.00").unwrap()),
            compare_at_price: None,
            default_variant_id: Some("4400001".to_string()),
        }
    }

    #[test]
    fn normalized_sorts_tags_and_strips_decimal_zeros() {
        let mut p = snapshot();
        p.tags = vec![
            "linen".to_string(),
            " kitchen ".to_string(),
            "linen".to_string(),
            String::new(),
        ];
        p.status = "ACTIVE".to_string();
        let n = p.normalized();
        assert_eq!(n.tags, vec!["kitchen".to_string(), "linen".to_string()]);
        assert_eq!(n.status, "active");
        assert_eq!(n.price.unwrap().to_string(), "34");
    }

    #[test]
    fn content_hash_ignores_identifier_fields() {
        let a = snapshot();
        let mut b = snapshot();
        b.shopify_id = None;
        b.default_variant_id = Some("999".to_string());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_ignores_trailing_decimal_zeros() {
        let a = snapshot();
        let mut b = snapshot();
        b.price = Some(Decimal::from_str("34").unwrap());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_changes_with_price() {
        let a = snapshot();
        let mut b = snapshot();
        b.price = Some(Decimal::from_str("36.00").unwrap());
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn versioned_fields_exclude_identifiers() {
        let fields = snapshot().versioned_fields();
        assert!(!fields.contains_key("shopify_id"));
        assert!(!fields.contains_key("default_variant_id"));
        assert_eq!(fields.len(), VERSIONED_PRODUCT_FIELDS.len());
    }

    #[test]
    fn json_round_trip_preserves_snapshot() {
        let p = snapshot().normalized();
        let value = serde_json::Value::Object(p.to_json_map());
        let back = ProductSnapshot::from_json(&value).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn from_json_rejects_wrong_shape() {
        let err = ProductSnapshot::from_json(&serde_json::json!({"title": 5})).unwrap_err();
        assert!(matches!(err, CoreError::Snapshot { entity: "product", .. }));
    }
}
