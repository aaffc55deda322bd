//! # ocpd-proto
//!
//! Wire types exchanged between the operator-facing client (`ocpdctl`) and the
//! agent running on the registry host.
//!
//! ## Endpoints
//!
//! Every request carries the shared secret in [`AUTH_TOKEN_HEADER`].
//!
//! - `GET /status` returns an [`AgentState`]
//! - `POST /data` accepts an opaque configuration document
//! - `POST /action` accepts an [`ActionRequest`]
//!
//! Field names on the wire are PascalCase (`RegistryHealth`, `ClusterVersion`)
//! and enum values are their variant names (`Healthy`, `DontExist`).

mod error;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::ProtoError;

/// Header carrying the shared secret on every request.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Port the agent listens on.
pub const DEFAULT_AGENT_PORT: u16 = 8090;

/// Cluster version sentinel sent with destroy actions.
pub const VERSION_NOT_APPLICABLE: &str = "N/A";

/// Request paths served by the agent.
pub mod paths {
    pub const STATUS: &str = "/status";
    pub const DATA: &str = "/data";
    pub const ACTION: &str = "/action";
}

/// Reachability of the mirror registry as seen from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryHealth {
    Healthy,
    Unhealthy,
}

impl RegistryHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for RegistryHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryHealth::Healthy => write!(f, "Healthy"),
            RegistryHealth::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Whether a cluster installation is present on the registry host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    Exists,
    DontExist,
}

impl ClusterStatus {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Exists)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterStatus::Exists => write!(f, "Exists"),
            ClusterStatus::DontExist => write!(f, "DontExist"),
        }
    }
}

/// Snapshot of the agent's view of the host.
///
/// The two fields always come from the same update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(rename = "RegistryHealth")]
    pub registry_health: RegistryHealth,

    #[serde(rename = "ClusterStatus")]
    pub cluster_status: ClusterStatus,
}

impl AgentState {
    /// Build the externally visible pair from raw probe observations.
    pub fn from_observations(registry_reachable: bool, cluster_present: bool) -> Self {
        Self {
            registry_health: if registry_reachable {
                RegistryHealth::Healthy
            } else {
                RegistryHealth::Unhealthy
            },
            cluster_status: if cluster_present {
                ClusterStatus::Exists
            } else {
                ClusterStatus::DontExist
            },
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            registry_health: RegistryHealth::Unhealthy,
            cluster_status: ClusterStatus::DontExist,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "registry={} cluster={}",
            self.registry_health, self.cluster_status
        )
    }
}

/// Lifecycle operation requested of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Deploy {
    Install,
    Destroy,
}

impl fmt::Display for Deploy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deploy::Install => write!(f, "Install"),
            Deploy::Destroy => write!(f, "Destroy"),
        }
    }
}

/// One-shot action directive sent to `POST /action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "Deploy")]
    pub deploy: Deploy,

    #[serde(rename = "ClusterVersion")]
    pub cluster_version: String,
}

impl ActionRequest {
    /// Install the given cluster version.
    pub fn install(cluster_version: impl Into<String>) -> Result<Self, ProtoError> {
        let cluster_version = cluster_version.into();
        if cluster_version.trim().is_empty() {
            return Err(ProtoError::MissingClusterVersion);
        }
        Ok(Self {
            deploy: Deploy::Install,
            cluster_version,
        })
    }

    /// Destroy the installed cluster.
    pub fn destroy() -> Self {
        Self {
            deploy: Deploy::Destroy,
            cluster_version: VERSION_NOT_APPLICABLE.to_string(),
        }
    }

    /// Returns an error unless this is a pair the agent acts on:
    /// `Install` with a version, or `Destroy` with the `N/A` sentinel.
    pub fn validate(&self) -> Result<(), ProtoError> {
        let ok = match self.deploy {
            Deploy::Install => {
                !self.cluster_version.trim().is_empty()
                    && self.cluster_version != VERSION_NOT_APPLICABLE
            }
            Deploy::Destroy => self.cluster_version == VERSION_NOT_APPLICABLE,
        };

        if ok {
            Ok(())
        } else {
            Err(ProtoError::InvalidAction {
                deploy: self.deploy.to_string(),
                cluster_version: self.cluster_version.clone(),
            })
        }
    }
}
