//! Periodic probes feeding the state store.
//!
//! - Registry probe: HTTPS GET against the local mirror registry; any 2xx is
//!   reachable, every other outcome is not
//! - Cluster probe: the installer leaves marker state files in its working
//!   directory; any marker present means a cluster exists or is being built

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::{AgentStateStore, ProbeTarget};

/// Marker files the installer writes into its working directory.
pub const CLUSTER_MARKERS: &[&str] = &["terraform.bootstrap.tfstate", "terraform.cluster.tfstate"];

/// A single yes/no observation of the host.
#[async_trait]
pub trait Probe: Send + Sync {
    /// The observation this probe feeds.
    fn target(&self) -> ProbeTarget;

    /// Observe once. Errors count as a negative observation.
    async fn observe(&self) -> bool;
}

/// Checks that the mirror registry answers over HTTPS.
pub struct RegistryProbe {
    client: reqwest::Client,
    url: String,
}

impl RegistryProbe {
    /// The registry serves a certificate from its own CA which the agent does
    /// not hold, so certificate verification is off for this probe only.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Probe for RegistryProbe {
    fn target(&self) -> ProbeTarget {
        ProbeTarget::Registry
    }

    async fn observe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Registry returned non-success");
                false
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Registry unreachable");
                false
            }
        }
    }
}

/// Looks for installer marker files in the install directory.
pub struct ClusterMarkerProbe {
    install_dir: PathBuf,
}

impl ClusterMarkerProbe {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }
}

#[async_trait]
impl Probe for ClusterMarkerProbe {
    fn target(&self) -> ProbeTarget {
        ProbeTarget::Cluster
    }

    async fn observe(&self) -> bool {
        for marker in CLUSTER_MARKERS {
            let path = self.install_dir.join(marker);
            match tokio::fs::try_exists(&path).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot check cluster marker");
                }
            }
        }
        false
    }
}

/// Run a probe on a fixed interval until shutdown.
pub async fn run_probe_loop(
    probe: Arc<dyn Probe>,
    store: Arc<AgentStateStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let target = probe.target();
    info!(
        probe = %target,
        interval_secs = interval.as_secs(),
        "Starting probe loop"
    );

    let mut interval_timer = tokio::time::interval(interval);
    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let observed = probe.observe().await;
                store.record(target, observed).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(probe = %target, "Probe loop shutting down");
                    break;
                }
            }
        }
    }
}
