mod config;
mod connection;
mod pipeline;
mod player;
mod session;
mod world;

use anyhow::Context;
use clap::Parser;
use config::{Cli, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(&cli.config)?;
    config.apply_cli(&cli);
    let config = Arc::new(config);

    let registry_path = config
        .registry_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("data"));
    if !registry_path.exists() {
        error!(path = %registry_path.display(), "registry data path does not exist, refusing to start");
        anyhow::bail!("missing registry data path: {}", registry_path.display());
    }
    info!(path = %registry_path.display(), "using registry data path");

    info!(
        bind = %config.bind,
        port = config.port,
        max_players = config.max_players,
        generator = %config.generator,
        view_distance = config.view_distance,
        "starting strata server"
    );

    let generator = strata_world::build_generator(&config.generator, config.seed);
    let chunks = strata_world::ChunkStore::new(generator);
    let world = Arc::new(world::WorldState::new(chunks));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ctrlc_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = ctrlc_tx.send(true);
        }
    });

    tokio::select! {
        _ = world::run_tick_loop(world.clone(), shutdown_rx) => {
            info!("world tick loop stopped, shutting down");
        }
        _ = accept_loop(listener, config, world) => {
            error!("accept loop exited unexpectedly");
        }
    }

    Ok(())
}

async fn accept_loop(listener: TcpListener, config: Arc<ServerConfig>, world: Arc<world::WorldState>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!(%peer, "new connection");
                let config = config.clone();
                let world = world.clone();
                tokio::spawn(async move {
                    connection::handle_connection(socket, config, world).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
