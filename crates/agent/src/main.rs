use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_agent::config::AgentConfig;
use fleet_agent::docker::ContainerRuntime;
use fleet_agent::heartbeat::HeartbeatLoop;
use fleet_agent::locks::NameLocks;
use fleet_agent::server::{self, AgentState};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fleetd-agent", about = "Worker-side container control daemon")]
struct Cli {
    #[command(flatten)]
    config: AgentConfig,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = cli.config;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    std::fs::create_dir_all(&config.data_dir)?;

    let runtime = ContainerRuntime::connect()?;
    let state = Arc::new(AgentState {
        hostname: config.hostname.clone(),
        vpn_address: config.vpn_address.clone(),
        worker_secret: config.worker_secret.clone(),
        runtime: runtime.clone(),
        locks: NameLocks::new(),
    });

    let heartbeat = Arc::new(HeartbeatLoop::new(
        config.hostname.clone(),
        config.leader_url.clone(),
        config.worker_secret.clone(),
        Duration::from_secs(config.heartbeat_interval_secs),
        runtime,
    ));
    heartbeat.start().await;

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!(addr = %config.socket_addr(), "agent control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
