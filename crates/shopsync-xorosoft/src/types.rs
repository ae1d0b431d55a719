//! Xorosoft REST response and request types.
//!
//! Every endpoint answers with the same envelope:
//! `{"Result": bool, "Message": str, "Data": [...]}`. Paged endpoints add
//! `TotalPages`. Field names are PascalCase throughout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct ApiEnvelope<T> {
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// A product record as Xorosoft returns it.
///
/// Only the fields the sync reads are typed; everything else is kept in
/// `extra` so reports can show the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XorosoftProduct {
    pub item_number: String,
    #[serde(default)]
    pub base_item_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "UPC")]
    pub upc: Option<String>,
    #[serde(default)]
    pub item_status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body for `POST product/getfiltered`. Unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_item_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "UPC")]
    pub upc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ProductPage {
    pub page: u32,
    pub products: Vec<XorosoftProduct>,
    /// Reported by the API when known.
    pub total_pages: Option<u32>,
}

impl ProductPage {
    /// Whether a following page may exist.
    #[must_use]
    pub fn has_more(&self, per_page: u32) -> bool {
        match self.total_pages {
            Some(total) => self.page < total,
            None => u32::try_from(self.products.len()).is_ok_and(|n| n >= per_page && n > 0),
        }
    }
}
