//! Agent state store.
//!
//! Each probe owns one observation and writes it under its own lock. The
//! externally visible [`AgentState`] is recomputed from both observations
//! under a separate lock, so readers only ever see a complete pair.

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use ocpd_proto::AgentState;

/// Which observation a probe feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Registry,
    Cluster,
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeTarget::Registry => write!(f, "registry"),
            ProbeTarget::Cluster => write!(f, "cluster"),
        }
    }
}

/// Volatile record of what the probes last saw.
///
/// Starts at the default pair (Unhealthy, DontExist) and is never persisted.
#[derive(Debug, Default)]
pub struct AgentStateStore {
    registry_reachable: Mutex<bool>,
    cluster_present: Mutex<bool>,
    state: RwLock<AgentState>,
}

impl AgentStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe observation and republish the pair.
    pub async fn record(&self, target: ProbeTarget, observed: bool) {
        match target {
            ProbeTarget::Registry => *self.registry_reachable.lock().await = observed,
            ProbeTarget::Cluster => *self.cluster_present.lock().await = observed,
        }
        self.publish().await;
    }

    /// Current snapshot of the pair.
    pub async fn snapshot(&self) -> AgentState {
        *self.state.read().await
    }

    // The composite lock is taken first and held while both fields are read,
    // so two concurrent publishers cannot interleave their recomputations.
    async fn publish(&self) {
        let mut state = self.state.write().await;
        let registry_reachable = *self.registry_reachable.lock().await;
        let cluster_present = *self.cluster_present.lock().await;

        let next = AgentState::from_observations(registry_reachable, cluster_present);
        if *state != next {
            debug!(from = %*state, to = %next, "Agent state changed");
            *state = next;
        }
    }
}
