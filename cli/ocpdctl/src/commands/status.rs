//! Status command - one probe of the agent.

use anyhow::Result;
use clap::Args;

use crate::output::print_status;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (controller, infra) = ctx.connect().await?;
        let state = controller.status().await?;
        print_status(&infra.public_dns, &state, ctx.format);
        Ok(())
    }
}
