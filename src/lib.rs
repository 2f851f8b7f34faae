pub mod cli;
pub mod core;
pub mod harvest;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::harvest::DetailTarget;
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub enum AppCommand {
    /// Harvest every listing page into base records
    List,
    /// Harvest detail pages
    Detail(DetailTarget),
    Status { list_pending: bool },
    Show(String),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Fund harvester starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let database_url = config.database_url()?;
    let store = SqliteStore::connect(&database_url)
        .await
        .with_context(|| format!("Failed to open database {database_url}"))?;

    let result = match command {
        AppCommand::List => cli::harvest::run_list(&config, &store).await,
        AppCommand::Detail(target) => cli::harvest::run_detail(&config, &store, &target).await,
        AppCommand::Status { list_pending } => cli::status::run_status(&store, list_pending).await,
        AppCommand::Show(id) => cli::status::run_show(&store, &id).await,
    };
    store.close().await;
    result
}
