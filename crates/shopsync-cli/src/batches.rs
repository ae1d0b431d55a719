use clap::Subcommand;
use shopsync_core::AppConfig;

use crate::connect;

#[derive(Debug, Subcommand)]
pub(crate) enum BatchesCommands {
    /// List recent sync batches, newest first
    List {
        /// Maximum number of batches to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run_batches(
    command: BatchesCommands,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let BatchesCommands::List { limit } = command;
    let pool = connect(config).await?;
    let batches = shopsync_db::list_sync_batches(&pool, limit).await?;

    if batches.is_empty() {
        println!("no sync batches recorded");
        return Ok(());
    }

    println!(
        "{:<38}{:<16}{:<11}{:>7}{:>7}{:>7}{:>7}  STARTED",
        "BATCH", "TYPE", "STATUS", "TOTAL", "OK", "FAIL", "SKIP"
    );
    for batch in &batches {
        println!(
            "{:<38}{:<16}{:<11}{:>7}{:>7}{:>7}{:>7}  {}",
            batch.batch_id,
            batch.batch_type,
            batch.status,
            batch.total_items,
            batch.successful_items,
            batch.failed_items,
            batch.skipped_items,
            batch.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(message) = &batch.error_message {
            println!("  error: {message}");
        }
    }
    Ok(())
}
