//! Provisioning layer adapters.
//!
//! Infrastructure is owned by Terraform configurations in the work
//! directory. This module applies and destroys them, hands the bootstrap
//! trust material over as variables, and reads back the outputs the
//! controller needs to reach the agent.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use ocpd_pki::BootstrapBundle;

use crate::inputs::RegistryInputs;

/// Variables file carrying the bootstrap bundle and pull secret. Holds secrets.
pub const BOOTSTRAP_VARS_FILE: &str = "bootstrap.auto.tfvars.json";

/// Variables file enabling the cluster dependencies.
pub const CLUSTER_VARS_FILE: &str = "cluster.auto.tfvars.json";

/// Terraform state file inspected when the agent cannot be reached.
pub const STATE_FILE: &str = "terraform.tfstate";

/// Module holding the cluster's network dependencies.
pub const CLUSTER_DEPENDENCIES_TARGET: &str = "module.Cluster_Dependencies";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` failed with {status}")]
    Failed { command: String, status: String },

    #[error("output `{name}` is empty")]
    MissingOutput { name: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to encode variables: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the provisioning state says exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentState {
    NotProvisioned,
    RegistryOnly,
    RegistryAndClusterDependencies,
    /// The state file is missing or unreadable.
    Unknown(String),
}

impl DeploymentState {
    /// Classify a parsed state document by the resource types it holds.
    pub fn from_state(state: &serde_json::Value) -> Self {
        let Some(resources) = state.get("resources").and_then(|r| r.as_array()) else {
            return Self::Unknown("state has no resources array".into());
        };

        let has = |kind: &str| {
            resources
                .iter()
                .any(|r| r.get("type").and_then(|t| t.as_str()) == Some(kind))
        };

        match (has("aws_instance"), has("aws_vpc_endpoint")) {
            (true, true) => Self::RegistryAndClusterDependencies,
            (true, false) => Self::RegistryOnly,
            _ => Self::NotProvisioned,
        }
    }

    /// Read and classify the state file in `work_dir`.
    pub fn inspect(work_dir: &Path) -> Self {
        let path = work_dir.join(STATE_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => return Self::Unknown(format!("{}: {e}", path.display())),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Self::from_state(&state),
            Err(e) => Self::Unknown(format!("{}: {e}", path.display())),
        }
    }
}

/// Identifiers resolved from provisioning outputs.
#[derive(Clone, PartialEq, Eq)]
pub struct InfraAddress {
    pub region: String,
    pub public_dns: String,
    pub private_subnets: [String; 3],
    pub private_hostname: String,
    pub token: String,
}

impl std::fmt::Debug for InfraAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfraAddress")
            .field("region", &self.region)
            .field("public_dns", &self.public_dns)
            .field("private_subnets", &self.private_subnets)
            .field("private_hostname", &self.private_hostname)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Infrastructure lifecycle.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the registry host, handing it the operator inputs and the
    /// bootstrap bundle.
    async fn apply(
        &self,
        inputs: &RegistryInputs,
        bundle: &BootstrapBundle,
    ) -> Result<(), ProvisionError>;

    /// Create the network dependencies a cluster install needs.
    async fn apply_cluster_dependencies(&self) -> Result<(), ProvisionError>;

    /// Tear everything down.
    async fn destroy(&self) -> Result<(), ProvisionError>;

    /// Best-effort view of what currently exists.
    fn deployment_state(&self) -> DeploymentState;
}

/// Resolves the agent's address and credentials.
#[async_trait]
pub trait InfraResolver: Send + Sync {
    async fn resolve(&self) -> Result<InfraAddress, ProvisionError>;
}

#[derive(Serialize)]
struct BootstrapVars<'a> {
    aws_region: &'a str,
    region_ami: &'a str,
    pull_secret: &'a str,
    ssh_public_key: &'a str,
    agent_ca_cert: &'a str,
    agent_ca_key: &'a str,
    agent_token: &'a str,
}

#[derive(Serialize)]
struct ClusterVars {
    deploy_cluster: bool,
}

/// Drives the `terraform` binary in a work directory.
#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    work_dir: PathBuf,
    binary: String,
}

impl TerraformProvisioner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary(work_dir, "terraform")
    }

    pub fn with_binary(work_dir: impl Into<PathBuf>, binary: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<(), ProvisionError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        info!(command = %command, "Running terraform");

        let status = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| ProvisionError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Failed {
                command,
                status: status.to_string(),
            })
        }
    }

    async fn write_vars(&self, name: &str, body: Vec<u8>) -> Result<(), ProvisionError> {
        let path = self.work_dir.join(name);
        let io_err = |source| ProvisionError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await.map_err(io_err)?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &body)
            .await
            .map_err(io_err)?;
        debug!(path = %path.display(), "Wrote variables file");
        Ok(())
    }

    async fn remove_generated(&self) {
        for name in [BOOTSTRAP_VARS_FILE, CLUSTER_VARS_FILE] {
            let path = self.work_dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed generated file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot remove generated file"),
            }
        }
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn apply(
        &self,
        inputs: &RegistryInputs,
        bundle: &BootstrapBundle,
    ) -> Result<(), ProvisionError> {
        let vars = BootstrapVars {
            aws_region: &inputs.region,
            region_ami: &inputs.image_id,
            pull_secret: &inputs.pull_secret,
            ssh_public_key: &inputs.ssh_public_key,
            agent_ca_cert: &bundle.ca_cert_pem,
            agent_ca_key: &bundle.ca_key_pem,
            agent_token: &bundle.token,
        };
        self.write_vars(BOOTSTRAP_VARS_FILE, serde_json::to_vec_pretty(&vars)?)
            .await?;

        self.run(&["init", "-input=false"]).await?;
        self.run(&["apply", "-input=false", "-auto-approve"]).await
    }

    async fn apply_cluster_dependencies(&self) -> Result<(), ProvisionError> {
        let vars = ClusterVars {
            deploy_cluster: true,
        };
        self.write_vars(CLUSTER_VARS_FILE, serde_json::to_vec_pretty(&vars)?)
            .await?;

        let target = format!("-target={CLUSTER_DEPENDENCIES_TARGET}");
        self.run(&["apply", "-input=false", &target, "-auto-approve"])
            .await
    }

    async fn destroy(&self) -> Result<(), ProvisionError> {
        self.run(&["destroy", "-input=false", "-auto-approve"]).await?;
        self.remove_generated().await;
        Ok(())
    }

    fn deployment_state(&self) -> DeploymentState {
        DeploymentState::inspect(&self.work_dir)
    }
}

/// Reads `terraform output --raw` values.
#[derive(Debug, Clone)]
pub struct TerraformOutputs {
    work_dir: PathBuf,
    binary: String,
}

impl TerraformOutputs {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary(work_dir, "terraform")
    }

    pub fn with_binary(work_dir: impl Into<PathBuf>, binary: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            binary: binary.into(),
        }
    }

    async fn output(&self, name: &str) -> Result<String, ProvisionError> {
        let command = format!("{} output --raw {name}", self.binary);
        let output = Command::new(&self.binary)
            .args(["output", "--raw", name])
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| ProvisionError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProvisionError::Failed {
                command,
                status: output.status.to_string(),
            });
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            return Err(ProvisionError::MissingOutput {
                name: name.to_string(),
            });
        }
        Ok(value)
    }
}

#[async_trait]
impl InfraResolver for TerraformOutputs {
    async fn resolve(&self) -> Result<InfraAddress, ProvisionError> {
        let address = InfraAddress {
            region: self.output("region").await?,
            public_dns: self.output("ec2_instance_public_dns").await?,
            private_subnets: [
                self.output("private_subnet_1_id").await?,
                self.output("private_subnet_2_id").await?,
                self.output("private_subnet_3_id").await?,
            ],
            private_hostname: self.output("ec2_private_hostname").await?,
            token: self.output("agent_token").await?,
        };
        debug!(infra = ?address, "Resolved infrastructure outputs");
        Ok(address)
    }
}
