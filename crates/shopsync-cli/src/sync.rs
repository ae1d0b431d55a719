use std::path::Path;

use clap::Subcommand;
use shopsync_core::AppConfig;

use crate::output::emit_report;
use crate::{connect, shopify_client};

#[derive(Debug, Subcommand)]
pub(crate) enum SyncCommands {
    /// Overwrite local products with Shopify's
    Products {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Overwrite local collections and their memberships with Shopify's
    Collections {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

pub(crate) async fn run_sync(
    command: SyncCommands,
    config: &AppConfig,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let client = shopify_client(config)?;
    let pool = connect(config).await?;

    let report = match command {
        SyncCommands::Products { dry_run } => {
            shopsync_pipeline::sync_products(&pool, &client, dry_run).await?
        }
        SyncCommands::Collections { dry_run } => {
            shopsync_pipeline::sync_collections(&pool, &client, dry_run).await?
        }
    };
    emit_report(&report, report_path)
}
