pub mod client;
pub mod error;
pub mod graphql;
pub mod normalize;
pub mod queries;
pub mod rate_limit;
pub mod retry;
pub mod types;

pub use client::{ClientSettings, ShopifyClient, DEFAULT_API_VERSION};
pub use error::ShopifyError;
pub use graphql::{Connection, GraphQLError, GraphQLResponse, PageInfo};
pub use normalize::{normalize_collection, normalize_product};
pub use rate_limit::RateLimiter;
pub use types::{CollectionNode, IdNode, ProductNode};
