//! CLI commands.

mod add_cluster;
mod destroy;
mod destroy_cluster;
mod init;
mod install;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use ocpd_pki::load_ca_cert;
use ocpd_proto::DEFAULT_AGENT_PORT;

use crate::client::AgentClient;
use crate::controller::{ControllerConfig, ReconciliationController};
use crate::error::CliError;
use crate::install_config::{self, NetworkType, Substitutions, CUSTOM_INSTALL_CONFIG};
use crate::output::OutputFormat;
use crate::provision::{InfraAddress, InfraResolver, TerraformOutputs, TerraformProvisioner};

/// ocpdctl - Deploy a disconnected mirror registry and clusters installed from it.
#[derive(Debug, Parser)]
#[command(name = "ocpdctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the Terraform configuration and generated files.
    #[arg(long, global = true, env = "OCPD_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Port the agent listens on.
    #[arg(long, global = true, env = "OCPD_AGENT_PORT", default_value_t = DEFAULT_AGENT_PORT)]
    agent_port: u16,

    /// CA certificate used to verify the agent, relative to the work directory.
    #[arg(long, global = true, env = "OCPD_CA_CERT", default_value = "CAcert.pem")]
    ca_cert: PathBuf,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record the pull secret and SSH public key used for the registry host.
    Init(init::InitCommand),

    /// Provision the registry host, optionally followed by a cluster.
    Install(install::InstallCommand),

    /// Install a cluster from an existing registry host.
    AddCluster(add_cluster::AddClusterCommand),

    /// Destroy the cluster (if any) and all infrastructure.
    Destroy(destroy::DestroyCommand),

    /// Destroy the cluster but keep the registry host.
    DestroyCluster(destroy_cluster::DestroyClusterCommand),

    /// Show registry health and cluster presence as seen by the agent.
    Status(status::StatusCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ca_cert_path = self.work_dir.join(&self.ca_cert);
        let ctx = CommandContext {
            work_dir: self.work_dir,
            agent_port: self.agent_port,
            ca_cert_path,
            format: self.format,
            controller: ControllerConfig::default(),
        };

        match self.command {
            Commands::Init(cmd) => cmd.run(ctx).await,
            Commands::Install(cmd) => cmd.run(ctx).await,
            Commands::AddCluster(cmd) => cmd.run(ctx).await,
            Commands::Destroy(cmd) => cmd.run(ctx).await,
            Commands::DestroyCluster(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Ask on stderr and read one trimmed line from stdin.
async fn prompt(question: &str) -> Result<String> {
    eprint!("{question} ");
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(answer.trim().to_string())
}

/// Options shared by the commands that install a cluster.
#[derive(Debug, Args)]
pub struct ClusterArgs {
    /// Use OpenShiftSDN instead of the default OVNKubernetes network plugin.
    #[arg(long)]
    sdn: bool,

    /// Use `install-config.yaml` from the work directory instead of the default.
    #[arg(long)]
    custom_install_config: bool,

    /// Base DNS domain for the default install configuration.
    #[arg(long, env = "OCPD_BASE_DOMAIN", default_value = "ocpd.example.com")]
    base_domain: String,
}

/// Controller wired to the real agent and Terraform.
pub type Controller = ReconciliationController<AgentClient, TerraformProvisioner>;

/// Shared command context.
pub struct CommandContext {
    pub work_dir: PathBuf,
    pub agent_port: u16,
    pub ca_cert_path: PathBuf,
    pub format: OutputFormat,
    pub controller: ControllerConfig,
}

impl CommandContext {
    pub fn provisioner(&self) -> TerraformProvisioner {
        TerraformProvisioner::new(&self.work_dir)
    }

    pub fn resolver(&self) -> TerraformOutputs {
        TerraformOutputs::new(&self.work_dir)
    }

    /// Resolve the agent's address and build a controller for it.
    pub async fn connect(&self) -> Result<(Controller, InfraAddress)> {
        let infra = self.resolver().resolve().await?;
        let ca_cert = load_ca_cert(&self.ca_cert_path).map_err(|_| CliError::MissingCaCert {
            path: self.ca_cert_path.display().to_string(),
        })?;

        let agent = AgentClient::new(&infra.public_dns, self.agent_port, &ca_cert, &infra.token)?;
        let controller = ReconciliationController::new(agent, self.provisioner(), self.controller);
        Ok((controller, infra))
    }

    /// Build the installer configuration for the resolved infrastructure.
    pub fn install_config(
        &self,
        args: &ClusterArgs,
        infra: &InfraAddress,
    ) -> Result<serde_json::Value> {
        let custom = args
            .custom_install_config
            .then(|| self.work_dir.join(CUSTOM_INSTALL_CONFIG));
        let substitutions = Substitutions::new(
            infra,
            NetworkType::from_sdn_flag(args.sdn),
            &args.base_domain,
        );
        install_config::build(custom.as_deref(), &substitutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "ocpdctl",
            "install",
            "--region",
            "eu-west-1",
            "--cluster-version",
            "4.14.1",
            "--sdn",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Install(_)));
        assert_eq!(cli.agent_port, DEFAULT_AGENT_PORT);

        let cli = Cli::try_parse_from(["ocpdctl", "destroy", "--force", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Destroy(_)));

        let cli = Cli::try_parse_from([
            "ocpdctl",
            "init",
            "--pull-secret",
            "/home/op/pull-secret.json",
            "--public-key",
            "/home/op/.ssh/id_ed25519.pub",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Init(_)));

        let cli = Cli::try_parse_from(["ocpdctl", "status", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_add_cluster_requires_version() {
        assert!(Cli::try_parse_from(["ocpdctl", "add-cluster"]).is_err());
        assert!(Cli::try_parse_from(["ocpdctl", "install"]).is_err());
    }
}
