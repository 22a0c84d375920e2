//! Confluence Engine - signal service
//!
//! 1. Loads configuration from the environment
//! 2. Restores weights, pending signals and cooldowns from the data dir
//! 3. Runs the analysis loop until Ctrl-C

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use confluence_engine::market::{FundamentalSource, MarketData};
use confluence_engine::notify::Notifier;
use confluence_engine::state::StateManager;
use confluence_engine::store::SignalStore;
use confluence_engine::{
    EngineConfig, HttpFundamentals, HttpMarketData, JsonFileStore, LogNotifier,
    NeutralFundamentals, Scheduler, WebhookNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    info!("Starting Confluence Engine...");
    info!(
        "Watchlist: {:?}, data service: {}",
        config.symbols(),
        config.data_retrieval_url
    );

    let data_dir = config.data_dir();
    let store: Arc<dyn SignalStore> = Arc::new(
        JsonFileStore::open(&data_dir)
            .await
            .with_context(|| format!("Failed to open store at {}", data_dir.display()))?,
    );

    let state = StateManager::new(&data_dir);
    state.init().await.context("Failed to create state directory")?;

    let market: Arc<dyn MarketData> = Arc::new(HttpMarketData::new(&config.data_retrieval_url)?);
    let fundamentals: Arc<dyn FundamentalSource> = match &config.fundamentals_url {
        Some(url) => Arc::new(HttpFundamentals::new(url)?),
        None => {
            warn!("No fundamentals service configured, using neutral fundamentals");
            Arc::new(NeutralFundamentals)
        }
    };
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url, 10)?),
        None => Arc::new(LogNotifier),
    };

    let scheduler = Scheduler::from_config(
        &config,
        market,
        fundamentals,
        store,
        Some(notifier),
        Some(state),
    )?;
    scheduler
        .restore()
        .await
        .context("Failed to restore persisted state")?;
    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    scheduler.stop().await;

    Ok(())
}
