use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod config;
mod dashboard;
mod features;
mod refresh;
mod snapshot;

use api::ApiSports;
use config::Config;
use dashboard::AppState;
use refresh::Refresher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    if config.api_key.is_none() {
        warn!("No API_KEY configured – upstream fetches will come back empty");
    }

    let provider = Arc::new(ApiSports::from_config(&config)?);
    let refresher = Arc::new(Refresher::new(config.clone(), provider)?);
    info!(
        "Snapshot cache at {}, refresh policy {}",
        config.cache_file,
        refresher.policy().describe()
    );

    // Startup pass, exactly like a first dashboard load
    let outcome = refresher.ensure_fresh(false).await?;
    if outcome.refreshed {
        info!("Fetching new data... done (last_update={})", outcome.snapshot.last_update);
        if !outcome.failed_datasets.is_empty() {
            warn!("Datasets fetched empty: {:?}", outcome.failed_datasets);
        }
    } else {
        info!("Using cached data... (last_update={})", outcome.snapshot.last_update);
    }

    // Serve the dashboard (blocks until shutdown)
    let app = dashboard::router(AppState { refresher });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
