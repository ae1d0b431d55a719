use thiserror::Error;

/// Errors returned by the Xorosoft API client.
#[derive(Debug, Error)]
pub enum XorosoftError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 429 after every attempt was used.
    #[error("rate limited by Xorosoft")]
    RateLimited,

    #[error("Xorosoft returned server error {status}")]
    ServerError { status: u16 },

    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The envelope came back with `"Result": false`.
    #[error("Xorosoft API error: {0}")]
    ApiError(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}
