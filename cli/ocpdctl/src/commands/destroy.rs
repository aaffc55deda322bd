//! Destroy command - remove the cluster (through the agent) and all
//! infrastructure.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::warn;

use ocpd_pki::remove_ca_cert;

use crate::error::CliError;
use crate::output::print_success;
use crate::provision::Provisioner;

use super::{prompt, CommandContext};

#[derive(Debug, Args)]
pub struct DestroyCommand {
    /// Skip the agent and destroy the infrastructure directly. Any cluster
    /// installed from the registry host is NOT destroyed.
    #[arg(long)]
    force: bool,

    /// Do not ask for confirmation of a forced destroy.
    #[arg(long, requires = "force")]
    yes: bool,
}

impl DestroyCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        if self.force {
            if !self.yes && !confirm_forced_destroy().await? {
                return Err(CliError::NotConfirmed.into());
            }
            warn!("Forced destroy: bypassing the agent");
            ctx.provisioner().destroy().await?;
        } else {
            let (controller, _) = ctx.connect().await?;
            controller.destroy().await?;
        }

        remove_ca_cert(&ctx.ca_cert_path)?;
        print_success("The infrastructure was destroyed.");
        Ok(())
    }
}

async fn confirm_forced_destroy() -> Result<bool> {
    eprintln!(
        "{}",
        "A forced destroy skips the agent. A cluster installed from the registry host will be left running."
            .yellow()
    );
    Ok(prompt("Type 'yes' to continue:").await? == "yes")
}
