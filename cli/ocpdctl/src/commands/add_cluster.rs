//! Add-cluster command - install a cluster from an existing registry host.

use anyhow::Result;
use clap::Args;

use ocpd_proto::ActionRequest;

use crate::controller::ControllerError;
use crate::output::print_success;
use crate::provision::Provisioner;

use super::{ClusterArgs, CommandContext};

#[derive(Debug, Args)]
pub struct AddClusterCommand {
    /// Cluster version to install (e.g. 4.14.1).
    #[arg(long)]
    cluster_version: String,

    #[command(flatten)]
    cluster: ClusterArgs,
}

impl AddClusterCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let action = ActionRequest::install(&self.cluster_version)?;

        let (controller, _) = ctx.connect().await?;
        if controller.status().await?.cluster_status.exists() {
            return Err(ControllerError::AlreadyInstalled.into());
        }

        controller.provisioner().apply_cluster_dependencies().await?;

        // Subnet outputs only exist once the cluster dependencies are applied.
        let (controller, infra) = ctx.connect().await?;
        let document = ctx.install_config(&self.cluster, &infra)?;
        controller.install(&action, &document).await?;

        print_success(&format!(
            "Cluster {} installation started on {}.",
            action.cluster_version, infra.public_dns
        ));
        Ok(())
    }
}
