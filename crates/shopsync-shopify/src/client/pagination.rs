//! Cursor pagination over GraphQL connections for `ShopifyClient`.

use serde::de::DeserializeOwned;

use crate::error::ShopifyError;
use crate::graphql::Connection;

use super::ShopifyClient;

/// Maximum number of pages to fetch before returning an error.
/// Prevents infinite loops on cycling cursors.
///
/// Each page request may itself be retried, so the worst-case request count
/// is `MAX_PAGES * max_attempts`.
pub const MAX_PAGES: usize = 200;

/// Walks `path` from the `data` object down to a connection and decodes it.
///
/// # Errors
///
/// Returns [`ShopifyError::MissingData`] if any segment is absent or `null`
/// and [`ShopifyError::Deserialize`] if the value is not a connection of `N`.
pub fn extract_connection<N: DeserializeOwned>(
    data: &serde_json::Value,
    path: &[&str],
) -> Result<Connection<N>, ShopifyError> {
    let mut current = data;
    for segment in path {
        current = current
            .get(segment)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ShopifyError::MissingData(path.join(".")))?;
    }

    serde_json::from_value(current.clone()).map_err(|e| ShopifyError::Deserialize {
        context: format!("connection at {}", path.join(".")),
        source: e,
    })
}

impl ShopifyClient {
    /// Fetches every node of a paginated connection.
    ///
    /// `query` must declare `$first: Int!` and `$after: String`; both are set
    /// here on top of `variables`. `connection_path` locates the connection
    /// inside `data`, e.g. `["products"]` or `["collection", "products"]`.
    ///
    /// **All-or-nothing semantics**: GraphQL errors on any page abort the
    /// fetch and the nodes gathered so far are discarded.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::execute`] errors, returns [`ShopifyError::GraphQL`]
    /// for pages carrying errors and [`ShopifyError::PaginationLimit`] past
    /// [`MAX_PAGES`].
    pub async fn fetch_all_nodes<N: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        connection_path: &[&str],
    ) -> Result<Vec<N>, ShopifyError> {
        let mut base = match variables {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        base.insert("first".to_owned(), self.page_size.into());

        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0usize;

        loop {
            page_count += 1;
            if page_count > MAX_PAGES {
                return Err(ShopifyError::PaginationLimit {
                    max_pages: MAX_PAGES,
                });
            }

            let mut vars = base.clone();
            vars.insert(
                "after".to_owned(),
                cursor
                    .as_ref()
                    .map_or(serde_json::Value::Null, |c| c.clone().into()),
            );

            let data = self
                .execute::<serde_json::Value>(query, serde_json::Value::Object(vars), true)
                .await?
                .into_data()?;
            let connection: Connection<N> = extract_connection(&data, connection_path)?;

            let received = connection.edges.len();
            nodes.extend(connection.edges.into_iter().map(|e| e.node));
            tracing::debug!(
                page = page_count,
                received,
                total = nodes.len(),
                path = %connection_path.join("."),
                "fetched connection page"
            );

            if !connection.page_info.has_next_page {
                break;
            }
            match connection.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(ShopifyError::MissingData(format!(
                        "{}.pageInfo.endCursor",
                        connection_path.join(".")
                    )))
                }
            }
        }

        Ok(nodes)
    }
}
