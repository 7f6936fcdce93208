use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_crypto::CryptoVault;
use fleet_leader::cluster_manager::ClusterManager;
use fleet_leader::config::LeaderConfig;
use fleet_leader::credentials::CredentialStore;
use fleet_leader::deployment_engine::DeploymentEngine;
use fleet_leader::metrics::Metrics;
use fleet_leader::server::{self, AppState};
use fleet_leader::stale_reaper::StaleReaper;
use fleet_store::{Stores, StoreConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fleetd-leader", about = "Control-plane daemon for a fleet of mesh-networked hosts")]
struct Cli {
    #[command(flatten)]
    config: LeaderConfig,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = Arc::new(cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if config.master_secret.is_empty() {
        tracing::error!("MASTER_SECRET is required");
        std::process::exit(1);
    }

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.credentials_dir())?;

    let stores = match Stores::open(&config.data_dir, &StoreConfig::default()) {
        Ok(s) => Arc::new(s),
        Err(err) => {
            tracing::error!(error = %err, "failed to open data directory");
            std::process::exit(1);
        }
    };

    let vault = Arc::new(CryptoVault::from_master_secret(&config.master_secret));
    let credentials = CredentialStore::new(config.credentials_dir(), (*vault).clone());

    let cluster = ClusterManager::new(Arc::clone(&stores), Arc::clone(&vault), Arc::clone(&config));
    cluster.bootstrap_self()?;

    let engine = DeploymentEngine::new(cluster.clone());
    let metrics = Arc::new(Metrics::new().map_err(|e| color_eyre::eyre::eyre!(e))?);

    let reaper = StaleReaper::new(
        Arc::clone(&stores),
        Duration::from_secs(config.reaper_interval_secs),
        config.stale_threshold_secs,
    );
    reaper.start().await;

    let app = server::router(AppState {
        cluster,
        engine,
        metrics,
        credentials,
    });

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!(addr = %config.socket_addr(), "leader control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
