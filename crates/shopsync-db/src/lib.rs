use std::time::Duration;

use shopsync_core::{AppConfig, CoreError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

pub mod approval_rules;
pub mod audit_log;
pub mod collections;
pub mod products;
pub mod staged_changes;
pub mod sync_batches;
pub mod sync_versions;

pub use approval_rules::{list_active_approval_rules, seed_approval_rules};
pub use audit_log::{list_audit_entries_for_change, record_audit, AuditEntryRow, NewAuditEntry};
pub use collections::{
    get_collection_by_handle, insert_collection, list_collection_product_ids,
    replace_collection_products, update_collection, CollectionRow,
};
pub use products::{
    delete_product, get_product, get_product_by_shopify_id, get_product_for_update,
    insert_product, list_linked_products, list_products_with_sku, mark_product_synced,
    product_ids_by_shopify_ids, update_product, ProductRow,
};
pub use staged_changes::{
    approve_staged_change, get_staged_change, get_staged_change_for_update,
    insert_staged_change, list_recent_staged_changes, list_staged_changes,
    mark_staged_change_applied, mark_staged_change_rolled_back, reject_staged_change,
    supersede_pending_changes, NewStagedChange, StagedChangeRow,
};
pub use sync_batches::{
    cancel_sync_batch, create_sync_batch, fail_sync_batch, finish_sync_batch, get_sync_batch,
    list_sync_batches, BatchCounts, BatchType, SyncBatchRow,
};
pub use sync_versions::{get_sync_version, list_sync_versions, record_sync_version, SyncVersionRow};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/shopsync-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("record not found")]
    NotFound,
    #[error("staged change {change_id} is not in status '{expected_status}'")]
    InvalidStagedChangeTransition {
        change_id: Uuid,
        expected_status: &'static str,
    },
    #[error("sync batch {batch_id} is not in status '{expected_status}'")]
    InvalidSyncBatchTransition {
        batch_id: Uuid,
        expected_status: &'static str,
    },
    /// A stored value no longer decodes into its domain type.
    #[error("corrupt row in {table}: {source}")]
    Corrupt {
        table: &'static str,
        #[source]
        source: CoreError,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect using `DATABASE_URL` and pool settings from the loaded config.
///
/// # Errors
///
/// Returns [`DbError::MissingDatabaseUrl`] if no database URL is configured,
/// or [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_config(config: &AppConfig) -> Result<PgPool, DbError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(DbError::MissingDatabaseUrl)?;
    connect_pool(database_url, PoolConfig::from_app_config(config))
        .await
        .map_err(DbError::from)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // _sqlx_migrations does not exist on a fresh database; count that as zero.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

pub(crate) fn corrupt(table: &'static str) -> impl FnOnce(CoreError) -> DbError {
    move |source| DbError::Corrupt { table, source }
}
