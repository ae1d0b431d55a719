use std::path::PathBuf;

use clap::Subcommand;
use shopsync_core::AppConfig;

use crate::connect;

#[derive(Debug, Subcommand)]
pub(crate) enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Run pending migrations
    Migrate,
    /// Load approval rules from YAML into the database
    SeedRules {
        /// Rules file (defaults to SHOPSYNC_APPROVAL_RULES_PATH)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub(crate) async fn run_db(command: DbCommands, config: &AppConfig) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match command {
        DbCommands::Ping => {
            shopsync_db::ping(&pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = shopsync_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::SeedRules { path } => {
            let path = path.unwrap_or_else(|| config.approval_rules_path.clone());
            let file = shopsync_core::load_approval_rules(&path)?;
            let seeded = shopsync_db::seed_approval_rules(&pool, &file.rules).await?;
            tracing::info!(path = %path.display(), seeded, "approval rules seeded");
            println!("seeded {seeded} approval rule(s) from {}", path.display());
        }
    }
    Ok(())
}
