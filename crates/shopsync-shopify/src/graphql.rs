//! GraphQL request and response envelopes.
//!
//! Shopify answers most application-level failures with HTTP 200 and an
//! `errors` array next to (possibly partial) `data`. [`GraphQLResponse`] keeps
//! both so callers decide whether partial data is usable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ShopifyError;

#[derive(Debug, Serialize)]
pub struct GraphQLRequest<'a> {
    pub query: &'a str,
    pub variables: &'a serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub extensions: Option<serde_json::Value>,
}

impl GraphQLError {
    /// `extensions.code`, e.g. `"THROTTLED"` or `"ACCESS_DENIED"`.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

pub(crate) fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct GraphQLResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

impl<T> GraphQLResponse<T> {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts the soft-error envelope into a hard result.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::GraphQL`] when `errors` is non-empty, or
    /// [`ShopifyError::MissingData`] when there is neither data nor errors.
    pub fn into_data(self) -> Result<T, ShopifyError> {
        if !self.errors.is_empty() {
            return Err(ShopifyError::GraphQL(self.errors));
        }
        self.data
            .ok_or_else(|| ShopifyError::MissingData("GraphQL response".to_string()))
    }
}

/// A Relay-style connection as Shopify returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "N: DeserializeOwned"))]
pub struct Connection<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "N: DeserializeOwned"))]
pub struct Edge<N> {
    pub node: N,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// Mutation payload errors (`userErrors { field message }`).
#[derive(Debug, Clone, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

impl UserError {
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.field {
            Some(path) if !path.is_empty() => format!("{}: {}", path.join("."), self.message),
            _ => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_keeps_partial_data_next_to_errors() {
        let resp: GraphQLResponse<serde_json::Value> = serde_json::from_value(json!({
            "data": {"shop": {"name": "Acme"}},
            "errors": [{"message": "Field 'x' doesn't exist", "extensions": {"code": "undefinedField"}}]
        }))
        .unwrap();

        assert!(resp.has_errors());
        assert_eq!(resp.errors[0].code(), Some("undefinedField"));
        assert!(resp.data.is_some());
    }

    #[test]
    fn into_data_fails_on_errors() {
        let resp: GraphQLResponse<serde_json::Value> = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "Throttled"}, {"message": "again"}]
        }))
        .unwrap();

        let err = resp.into_data().unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: Throttled; again");
    }

    #[test]
    fn into_data_without_data_or_errors_is_missing_data() {
        let resp: GraphQLResponse<serde_json::Value> =
            serde_json::from_value(json!({})).unwrap();
        assert!(matches!(resp.into_data(), Err(ShopifyError::MissingData(_))));
    }

    #[test]
    fn connection_decodes_page_info() {
        let conn: Connection<serde_json::Value> = serde_json::from_value(json!({
            "edges": [{"node": {"id": "gid://shopify/Product/1"}, "cursor": "c1"}],
            "pageInfo": {"hasNextPage": true, "endCursor": "c1"}
        }))
        .unwrap();
        assert_eq!(conn.edges.len(), 1);
        assert!(conn.page_info.has_next_page);
        assert_eq!(conn.page_info.end_cursor.as_deref(), Some("c1"));
    }

    #[test]
    fn user_error_describe_includes_field_path() {
        let e = UserError {
            field: Some(vec!["input".to_string(), "handle".to_string()]),
            message: "has already been taken".to_string(),
        };
        assert_eq!(e.describe(), "input.handle: has already been taken");
    }
}
