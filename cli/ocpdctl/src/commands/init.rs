//! Init command - record the pull secret and SSH public key locations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::inputs::{sanitize_pull_secret, InitData, INIT_FILE};
use crate::output::print_success;

use super::{prompt, CommandContext};

#[derive(Debug, Args)]
pub struct InitCommand {
    /// Absolute path of the pull secret. Prompted for when omitted.
    #[arg(long)]
    pull_secret: Option<PathBuf>,

    /// Absolute path of the SSH public key. Prompted for when omitted.
    #[arg(long)]
    public_key: Option<PathBuf>,
}

impl InitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let pull_secret_path = match self.pull_secret {
            Some(path) => path,
            None => prompt("Provide the absolute path of the pull-secret:").await?.into(),
        };
        let public_key_path = match self.public_key {
            Some(path) => path,
            None => prompt("Provide the absolute path of the public key:").await?.into(),
        };

        let raw = std::fs::read_to_string(&pull_secret_path)
            .with_context(|| format!("Cannot read {}", pull_secret_path.display()))?;
        sanitize_pull_secret(&raw)?;
        if !public_key_path.is_file() {
            anyhow::bail!("No public key at {}", public_key_path.display());
        }

        let init = InitData {
            pull_secret_path,
            public_key_path,
        };
        init.save(&ctx.work_dir)?;
        info!(init = ?init, "Saved init data");

        print_success(&format!(
            "Saved pull secret and public key paths to {}.",
            ctx.work_dir.join(INIT_FILE).display()
        ));
        Ok(())
    }
}
