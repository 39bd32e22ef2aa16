//! `meridiandb` process entry point.
//!
//! Loads the cluster's static bootstrap configuration and the process-wide coordinator
//! configuration, wires them into a [`meridian_server::MeridianCore`], starts transaction
//! recovery and the garbage-collection sweeper, and runs until asked to stop.

mod bootstrap;

use std::sync::Arc;

use anyhow::Result;
use bootstrap::{ClusterConfig, InProcessCoordinatorRepository, LoopbackShardTransport, StaticClusterSource};
use meridian_core::config::load_or_default;
use meridian_server::{MeridianCore, MeridianServerConfig};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("meridiandb=info".parse()?))
        .json()
        .init();

    info!("starting meridiandb");

    let cluster: ClusterConfig = load_or_default("meridiandb-cluster.json").await?;
    let server_config: MeridianServerConfig = load_or_default("meridiandb-server.json").await?;

    let source = Arc::new(StaticClusterSource::new(cluster));
    let repo = Arc::new(InProcessCoordinatorRepository::default());
    let transport = Arc::new(LoopbackShardTransport);

    let core = MeridianCore::init(source.clone(), source, repo, transport, server_config);

    if let Err(e) = core.start().await {
        error!(error = %e, "failed to start meridiandb core");
        return Err(e.into());
    }

    info!("meridiandb started");

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping meridiandb"),
        Err(err) => error!(error = %err, "unable to listen for shutdown signal"),
    }

    core.shutdown().await;
    info!("meridiandb stopped");
    Ok(())
}
