//! Install command - provision the registry host and optionally a cluster.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use ocpd_pki::BootstrapBundle;
use ocpd_proto::ActionRequest;

use crate::controller::warm_up;
use crate::inputs::{InitData, RegistryInputs};
use crate::output::{print_info, print_success};
use crate::provision::Provisioner;

use super::{ClusterArgs, CommandContext};

#[derive(Debug, Args)]
pub struct InstallCommand {
    /// AWS region for the registry host.
    #[arg(long)]
    region: String,

    /// Cluster version to install once the registry is up (e.g. 4.14.1).
    /// Only the registry is deployed when omitted.
    #[arg(long)]
    cluster_version: Option<String>,

    #[command(flatten)]
    cluster: ClusterArgs,
}

impl InstallCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let action = self
            .cluster_version
            .as_deref()
            .map(ActionRequest::install)
            .transpose()?;

        let init = InitData::load(&ctx.work_dir)?;
        let inputs = RegistryInputs::load(&init, &self.region)?;

        let provisioner = ctx.provisioner();
        provision_registry(&provisioner, &inputs, &ctx.ca_cert_path).await?;

        let Some(action) = action else {
            print_success("Registry deployed. No cluster version specified.");
            return Ok(());
        };

        warm_up(&ctx.controller).await;
        provisioner.apply_cluster_dependencies().await?;

        let (controller, infra) = ctx.connect().await?;
        let document = ctx.install_config(&self.cluster, &infra)?;
        controller.install(&action, &document).await?;

        print_success(&format!(
            "Cluster {} installation started on {}.",
            action.cluster_version, infra.public_dns
        ));
        print_info("Follow progress with `ocpdctl status`.");
        Ok(())
    }
}

/// Mint the trust bundle and create the registry host with it.
///
/// The CA certificate is persisted before applying: a partial apply can
/// still leave a live agent behind.
async fn provision_registry<P: Provisioner>(
    provisioner: &P,
    inputs: &RegistryInputs,
    ca_cert_path: &Path,
) -> Result<()> {
    let bundle = BootstrapBundle::mint()?;
    bundle.persist_ca_cert(ca_cert_path)?;
    info!(path = %ca_cert_path.display(), "Saved agent CA certificate");

    provisioner.apply(inputs, &bundle).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::provision::{DeploymentState, ProvisionError};

    struct FailingApply;

    #[async_trait]
    impl Provisioner for FailingApply {
        async fn apply(
            &self,
            _inputs: &RegistryInputs,
            _bundle: &BootstrapBundle,
        ) -> Result<(), ProvisionError> {
            Err(ProvisionError::Failed {
                command: "terraform apply".into(),
                status: "exit status: 1".into(),
            })
        }

        async fn apply_cluster_dependencies(&self) -> Result<(), ProvisionError> {
            Ok(())
        }

        async fn destroy(&self) -> Result<(), ProvisionError> {
            Ok(())
        }

        fn deployment_state(&self) -> DeploymentState {
            DeploymentState::RegistryOnly
        }
    }

    #[tokio::test]
    async fn test_ca_cert_kept_when_apply_fails() {
        let dir = TempDir::new().unwrap();
        let ca_cert_path = dir.path().join("CAcert.pem");
        let inputs = RegistryInputs {
            region: "eu-west-1".into(),
            image_id: "ami-07d4917b6f95f5c2a".into(),
            pull_secret: r#"{"auths":{}}"#.into(),
            ssh_public_key: "ssh-ed25519 AAAA".into(),
        };

        let err = provision_registry(&FailingApply, &inputs, &ca_cert_path)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ProvisionError>().is_some());
        let pem = ocpd_pki::load_ca_cert(&ca_cert_path).unwrap();
        assert!(pem.contains("BEGIN CERTIFICATE"));
    }
}
