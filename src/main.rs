use anyhow::Result;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use waste_monitor::api::rest::{AppState, RestApi};
use waste_monitor::config::{self, CONFIG_PATH_ENV};
use waste_monitor::db::DatabaseService;
use waste_monitor::services::Services;
use waste_monitor::store::Stores;

async fn run_app() -> Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.api.log_level),
    )
    .init();
    info!("Starting waste monitor");
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No {} set, using default configuration", CONFIG_PATH_ENV),
    }

    let (stores, database) = if config.database.url.is_empty() {
        warn!("database.url is empty; detections are kept in memory only");
        (Stores::in_memory(), None)
    } else {
        let database = Arc::new(DatabaseService::new(&config.database).await?);
        (database.stores(), Some(database))
    };

    let services = Services::new(stores, config.stats.clone());

    services.scheduler.clone().start().await?;
    info!("Daily stats scheduler started");

    let state = AppState {
        services: services.clone(),
        status: config.status.clone(),
        query: config.query.clone(),
        database,
    };
    let http_server = RestApi::new(&config.api, state)?;

    let server = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            error!("API server error: {}", e);
        }
    });
    info!("API server started");

    // Wait for termination signals
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    services.scheduler.shutdown().await?;
    info!("Daily stats scheduler stopped");

    server.abort();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
