use shopsync_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Shopify error: {0}")]
    Shopify(#[from] shopsync_shopify::ShopifyError),

    #[error("Xorosoft error: {0}")]
    Xorosoft(#[from] shopsync_xorosoft::XorosoftError),

    #[error("database error: {0}")]
    Db(#[from] shopsync_db::DbError),

    #[error(transparent)]
    Core(#[from] shopsync_core::CoreError),

    #[error("product '{handle}' failed validation: {}", join_validation(.errors))]
    Validation {
        handle: String,
        errors: Vec<ValidationError>,
    },

    /// An applied change whose product or version row is gone.
    #[error("staged change {change_id}: {reason}")]
    Inconsistent {
        change_id: uuid::Uuid,
        reason: String,
    },

    /// The product moved since the change was staged, so applying it would
    /// overwrite newer data.
    #[error("staged change {change_id} is stale: {reason}")]
    Stale {
        change_id: uuid::Uuid,
        reason: String,
    },

    #[error("failed to write report to {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(shopsync_db::DbError::Sqlx(e))
    }
}
