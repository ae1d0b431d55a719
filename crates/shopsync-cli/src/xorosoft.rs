use std::path::Path;

use clap::Subcommand;
use shopsync_core::AppConfig;

use crate::output::emit_report;
use crate::{connect, xorosoft_client};

#[derive(Debug, Subcommand)]
pub(crate) enum XorosoftCommands {
    /// Look up a single item number
    Lookup {
        /// Xorosoft item number (usually the product SKU)
        item_number: String,
    },
    /// Check local product SKUs against Xorosoft
    CheckSkus {
        /// Check at most this many products
        #[arg(long)]
        limit: Option<i64>,
    },
}

pub(crate) async fn run_xorosoft(
    command: XorosoftCommands,
    config: &AppConfig,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let client = xorosoft_client(config)?;
    match command {
        XorosoftCommands::Lookup { item_number } => {
            match client.get_product(&item_number).await? {
                Some(product) => println!("{}", serde_json::to_string_pretty(&product)?),
                None => println!("{item_number}: not found in Xorosoft"),
            }
            Ok(())
        }
        XorosoftCommands::CheckSkus { limit } => {
            let pool = connect(config).await?;
            let report = shopsync_pipeline::run_inventory_check(&pool, &client, limit).await?;
            emit_report(&report, report_path)
        }
    }
}
