use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use shopsync_core::AppConfig;
use shopsync_shopify::{ClientSettings, ShopifyClient};
use shopsync_xorosoft::{XorosoftClient, XorosoftSettings};
use tracing_subscriber::EnvFilter;

mod batches;
mod db;
mod output;
mod stage;
mod sync;
mod xorosoft;

use batches::BatchesCommands;
use db::DbCommands;
use stage::StageCommands;
use sync::SyncCommands;
use xorosoft::XorosoftCommands;

#[derive(Debug, Parser)]
#[command(name = "shopsync")]
#[command(about = "Keeps a Shopify catalog, a Postgres mirror and Xorosoft inventory in step")]
pub(crate) struct Cli {
    /// Shop domain, e.g. my-store.myshopify.com
    #[arg(long, global = true, env = "SHOPIFY_SHOP_URL", hide_env_values = true)]
    shop_url: Option<String>,

    /// Shopify Admin API access token
    #[arg(long, global = true, env = "SHOPIFY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, global = true)]
    debug: bool,

    /// Write the operation report as JSON to this path
    #[arg(long, global = true, value_name = "PATH")]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Shopify credential checks
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Mirror Shopify products and collections into the database
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Staged product changes: pull, review, apply, rollback and push
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },
    /// Sync batch history
    Batches {
        #[command(subcommand)]
        command: BatchesCommands,
    },
    /// Xorosoft inventory lookups
    Xorosoft {
        #[command(subcommand)]
        command: XorosoftCommands,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum AuthCommands {
    /// Verify the Shopify credentials by fetching the shop name
    Test,
}

fn init_tracing(debug: bool, log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(log_level)
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds the Shopify client. Fails before any network call when the shop
/// URL or token is missing.
pub(crate) fn shopify_client(config: &AppConfig) -> anyhow::Result<ShopifyClient> {
    let credentials = config.shopify_credentials()?;
    ShopifyClient::new(&credentials, &ClientSettings::from_app_config(config))
        .map_err(|e| anyhow::anyhow!("failed to build Shopify client: {e}"))
}

pub(crate) fn xorosoft_client(config: &AppConfig) -> anyhow::Result<XorosoftClient> {
    let (Some(key), Some(secret)) = (
        config.xorosoft_api_key.as_deref(),
        config.xorosoft_api_secret.as_deref(),
    ) else {
        anyhow::bail!("XOROSOFT_API_KEY and XOROSOFT_API_SECRET must be set");
    };
    XorosoftClient::new(key, secret, &XorosoftSettings::from_app_config(config))
        .map_err(|e| anyhow::anyhow!("failed to build Xorosoft client: {e}"))
}

pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    shopsync_db::connect_pool_from_config(config)
        .await
        .context("failed to connect to database")
}

async fn run_auth_test(config: &AppConfig) -> anyhow::Result<()> {
    let client = shopify_client(config)?;
    let shop = client
        .test_auth()
        .await
        .context("Shopify authentication failed")?;
    println!("authenticated: {shop}");
    Ok(())
}

async fn dispatch(
    command: Commands,
    config: &AppConfig,
    report: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Db { command } => db::run_db(command, config).await,
        Commands::Auth {
            command: AuthCommands::Test,
        } => run_auth_test(config).await,
        Commands::Sync { command } => sync::run_sync(command, config, report).await,
        Commands::Stage { command } => stage::run_stage(command, config, report).await,
        Commands::Batches { command } => batches::run_batches(command, config).await,
        Commands::Xorosoft { command } => xorosoft::run_xorosoft(command, config, report).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = shopsync_core::load_app_config_from_env()?;
    if cli.shop_url.is_some() {
        config.shopify_shop_url = cli.shop_url;
    }
    if cli.access_token.is_some() {
        config.shopify_access_token = cli.access_token;
    }
    init_tracing(cli.debug, &config.log_level);
    tracing::debug!(env = %config.env, "configuration loaded");

    dispatch(cli.command, &config, cli.report.as_deref()).await
}
