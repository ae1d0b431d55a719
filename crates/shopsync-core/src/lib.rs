pub mod app_config;
pub mod approval;
pub mod collections;
pub mod config;
pub mod ids;
pub mod products;
pub mod staging;
pub mod validation;
pub mod versioning;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, RateLimitMode, ShopifyCredentials};
pub use approval::{check_auto_approval, load_approval_rules, ApprovalRule, ApprovalRulesFile};
pub use collections::{CollectionSnapshot, CollectionType};
pub use config::{load_app_config, load_app_config_from_env};
pub use ids::{collection_gid, extract_numeric_id, product_gid, variant_gid};
pub use products::{ProductSnapshot, VERSIONED_PRODUCT_FIELDS};
pub use staging::{
    apply_proposed_fields, detect_changes, BatchStatus, ChangeStatus, ChangeType, EntityType,
    FieldChange, FieldChanges, StagedChangeView,
};
pub use validation::{validate_product_for_push, ValidationError};
pub use versioning::version_hash;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("missing Shopify credentials: {0} is not set (use the CLI flag or environment variable)")]
    MissingCredentials(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read approval rules file {path}: {source}")]
    RulesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse approval rules file: {0}")]
    RulesFileParse(#[source] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: ChangeStatus, to: ChangeStatus },

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("snapshot does not decode as {entity}: {source}")]
    Snapshot {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
