//! ocpd agent
//!
//! Runs on the registry host. Probes the mirror registry and the cluster
//! installer's working directory, serves the observed state over HTTPS and
//! runs install/destroy workflows on request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ocpd_agent::{
    api,
    config::Config,
    probes::{run_probe_loop, ClusterMarkerProbe, Probe, RegistryProbe},
    runner::ClusterLifecycleRunner,
    state::AppState,
    store::AgentStateStore,
    tls,
    workflow::ScriptWorkflow,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        listen_addr = %config.listen_addr,
        registry_url = %config.registry_url,
        install_dir = %config.install_dir.display(),
        "Starting ocpd agent"
    );

    tls::install_crypto_provider();
    let tls_config =
        tls::server_tls_config(&config.ca_cert_file, &config.ca_key_file, &config.server_names)
            .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let store = Arc::new(AgentStateStore::new());
    let interval = Duration::from_secs(config.probe_interval_secs);

    let probes: Vec<Arc<dyn Probe>> = vec![
        Arc::new(RegistryProbe::new(config.registry_url.clone(), interval)?),
        Arc::new(ClusterMarkerProbe::new(config.install_dir.clone())),
    ];
    let probe_handles: Vec<_> = probes
        .into_iter()
        .map(|probe| {
            tokio::spawn(run_probe_loop(
                probe,
                Arc::clone(&store),
                interval,
                shutdown_rx.clone(),
            ))
        })
        .collect();

    let runner = ClusterLifecycleRunner::new(Arc::new(ScriptWorkflow::from_config(&config)));
    let state = AppState::new(
        Arc::clone(&store),
        runner,
        config.token_file.clone(),
        config.install_config_path(),
    );
    let app = api::create_router(state);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("invalid listen address")?;
    let server_handle = tokio::spawn(tls::serve(addr, tls_config, app, shutdown_rx, None));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in probe_handles {
        let _ = handle.await;
    }

    info!("Agent shutdown complete");
    Ok(())
}
