use anyhow::Result;
use clap::Args;

use crate::controller::DestroyClusterOutcome;
use crate::output::{print_info, print_success};

use super::CommandContext;

/// Destroy-cluster command - remove the cluster, keep the registry.
#[derive(Debug, Args)]
pub struct DestroyClusterCommand {}

impl DestroyClusterCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (controller, _) = ctx.connect().await?;

        match controller.destroy_cluster().await? {
            DestroyClusterOutcome::Requested => {
                print_success("Cluster destroy requested. The registry host is kept.");
                print_info("Follow progress with `ocpdctl status`.");
            }
            DestroyClusterOutcome::NothingToDestroy => {
                print_info("There is no cluster installation present.");
            }
        }
        Ok(())
    }
}
