use thiserror::Error;

use crate::graphql::{join_messages, GraphQLError};

#[derive(Debug, Error)]
pub enum ShopifyError {
    /// Network or TLS failure after every attempt was used.
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("rate limited by Shopify after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("Shopify returned server error {status}")]
    ServerError { status: u16 },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("cannot convert {entity} {id}: {reason}")]
    Normalization {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("response has no data for {0}")]
    MissingData(String),

    #[error("pagination limit reached: exceeded {max_pages} pages")]
    PaginationLimit { max_pages: usize },

    #[error("{operation} rejected: {}", .messages.join("; "))]
    UserErrors {
        operation: &'static str,
        messages: Vec<String>,
    },

    #[error("invalid shop URL \"{shop_url}\": {reason}")]
    InvalidShopUrl { shop_url: String, reason: String },
}

impl ShopifyError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShopifyError::RequestFailed(_)
                | ShopifyError::RateLimited { .. }
                | ShopifyError::ServerError { .. }
        )
    }
}
