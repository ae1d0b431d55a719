//! Staged-change command handlers for the CLI.

mod query;

use std::path::Path;

use clap::Subcommand;
use shopsync_core::AppConfig;
use shopsync_pipeline::{PipelineError, PullOptions};
use uuid::Uuid;

use crate::output::emit_report;
use crate::{connect, shopify_client};

pub(crate) use query::{run_stage_list, run_stage_show};

/// Sub-commands available under `stage`.
#[derive(Debug, Subcommand)]
pub(crate) enum StageCommands {
    /// Stage differences between Shopify and the local products as pending changes
    Pull {
        /// Approve changes that satisfy the active approval rules
        #[arg(long)]
        auto_approve: bool,

        /// Report what would be staged without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List staged changes, newest first
    List {
        /// Only show changes in this status (pending, approved, rejected, applied, rolled_back)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of changes to show
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Show one staged change with its field diff and audit trail
    Show {
        change_id: Uuid,
    },
    /// Approve a pending change
    Approve {
        change_id: Uuid,

        #[arg(long, default_value = "cli")]
        reviewer: String,

        #[arg(long)]
        note: Option<String>,
    },
    /// Reject a pending change
    Reject {
        change_id: Uuid,

        #[arg(long, default_value = "cli")]
        reviewer: String,

        #[arg(long)]
        note: Option<String>,
    },
    /// Apply an approved change, or every approved change with --all-approved
    Apply {
        #[arg(required_unless_present = "all_approved")]
        change_id: Option<Uuid>,

        #[arg(long, conflicts_with = "change_id")]
        all_approved: bool,

        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Restore the product version an applied change overwrote
    Rollback {
        change_id: Uuid,

        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Push locally edited products to Shopify
    Push {
        /// Report what would be pushed without calling Shopify
        #[arg(long)]
        dry_run: bool,

        /// Concurrent pushes (defaults to SHOPSYNC_MAX_WORKERS)
        #[arg(long)]
        max_workers: Option<usize>,
    },
}

/// Names the change when the database has no row for it.
pub(crate) fn missing_change(change_id: Uuid, err: PipelineError) -> anyhow::Error {
    match err {
        PipelineError::Db(shopsync_db::DbError::NotFound) => {
            anyhow::anyhow!("staged change {change_id} not found")
        }
        other => other.into(),
    }
}

pub(crate) async fn run_stage(
    command: StageCommands,
    config: &AppConfig,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        StageCommands::Pull {
            auto_approve,
            dry_run,
        } => {
            let client = shopify_client(config)?;
            let pool = connect(config).await?;
            let options = PullOptions {
                auto_approve,
                dry_run,
            };
            let report = shopsync_pipeline::pull_product_changes(&pool, &client, options).await?;
            emit_report(&report, report_path)
        }
        StageCommands::List { status, limit } => {
            let pool = connect(config).await?;
            run_stage_list(&pool, status.as_deref(), limit).await
        }
        StageCommands::Show { change_id } => {
            let pool = connect(config).await?;
            run_stage_show(&pool, change_id).await
        }
        StageCommands::Approve {
            change_id,
            reviewer,
            note,
        } => {
            let pool = connect(config).await?;
            shopsync_pipeline::approve_change(&pool, change_id, &reviewer, note.as_deref())
                .await
                .map_err(|e| missing_change(change_id, e))?;
            println!("approved {change_id}");
            Ok(())
        }
        StageCommands::Reject {
            change_id,
            reviewer,
            note,
        } => {
            let pool = connect(config).await?;
            shopsync_pipeline::reject_change(&pool, change_id, &reviewer, note.as_deref())
                .await
                .map_err(|e| missing_change(change_id, e))?;
            println!("rejected {change_id}");
            Ok(())
        }
        StageCommands::Apply {
            change_id,
            all_approved,
            actor,
        } => {
            let pool = connect(config).await?;
            match change_id {
                Some(change_id) if !all_approved => {
                    let applied = shopsync_pipeline::apply_change(&pool, change_id, &actor)
                        .await
                        .map_err(|e| missing_change(change_id, e))?;
                    println!(
                        "applied {} to product {} (version {})",
                        applied.change_id, applied.product_id, applied.version_id
                    );
                    Ok(())
                }
                _ => {
                    let report = shopsync_pipeline::apply_approved_changes(&pool, &actor).await?;
                    emit_report(&report, report_path)
                }
            }
        }
        StageCommands::Rollback { change_id, actor } => {
            let pool = connect(config).await?;
            shopsync_pipeline::rollback_change(&pool, change_id, &actor)
                .await
                .map_err(|e| missing_change(change_id, e))?;
            println!("rolled back {change_id}");
            Ok(())
        }
        StageCommands::Push {
            dry_run,
            max_workers,
        } => {
            let client = shopify_client(config)?;
            let pool = connect(config).await?;
            let workers = max_workers.unwrap_or(config.max_workers);
            let report =
                shopsync_pipeline::push_product_changes(&pool, &client, dry_run, workers).await?;
            emit_report(&report, report_path)
        }
    }
}
