//! Configuration for the agent.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Installer configuration file name inside the install directory.
pub const INSTALL_CONFIG_FILE: &str = "install-config.yaml";

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTPS listener binds to.
    pub listen_addr: String,

    /// Mirror registry endpoint checked by the registry probe.
    pub registry_url: String,

    /// Installer working directory; holds the cluster markers and
    /// `install-config.yaml`.
    pub install_dir: PathBuf,

    /// File holding the shared token, re-read on every request.
    pub token_file: PathBuf,

    /// CA certificate delivered by the provisioning channel.
    pub ca_cert_file: PathBuf,

    /// CA private key delivered by the provisioning channel.
    pub ca_key_file: PathBuf,

    /// Subject alternative names for the leaf certificate.
    pub server_names: Vec<String>,

    /// Probe interval in seconds.
    pub probe_interval_secs: u64,

    /// Install script template with `$CLUSTER_VERSION` / `$RELEASE_CHANNEL`.
    pub install_script_template: PathBuf,

    /// Where the rendered install script is written.
    pub install_script: PathBuf,

    /// Installer binary used for teardown.
    pub installer_bin: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listen_addr = var(
            "OCPD_LISTEN_ADDR",
            &format!("0.0.0.0:{}", ocpd_proto::DEFAULT_AGENT_PORT),
        );
        listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("OCPD_LISTEN_ADDR is not a socket address: {listen_addr}"))?;

        let probe_interval_secs = match lookup("OCPD_PROBE_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("OCPD_PROBE_INTERVAL_SECS is not a number: {raw}"))?,
            None => 5,
        };
        if probe_interval_secs == 0 {
            anyhow::bail!("OCPD_PROBE_INTERVAL_SECS must be at least 1");
        }

        let server_names: Vec<String> = var("OCPD_SERVER_NAMES", "localhost,127.0.0.1")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if server_names.is_empty() {
            anyhow::bail!("OCPD_SERVER_NAMES must name at least one host");
        }

        Ok(Self {
            listen_addr,
            registry_url: var("OCPD_REGISTRY_URL", "https://localhost:8443"),
            install_dir: var("OCPD_INSTALL_DIR", "/ec2-user/cluster").into(),
            token_file: var("OCPD_TOKEN_FILE", "/app/agent-token").into(),
            ca_cert_file: var("OCPD_CA_CERT_FILE", "/app/ca.crt").into(),
            ca_key_file: var("OCPD_CA_KEY_FILE", "/app/ca.key").into(),
            server_names,
            probe_interval_secs,
            install_script_template: var(
                "OCPD_INSTALL_SCRIPT_TEMPLATE",
                "/app/cluster-installation-script.sh.template",
            )
            .into(),
            install_script: var("OCPD_INSTALL_SCRIPT", "/app/cluster-installation-script.sh")
                .into(),
            installer_bin: var("OCPD_INSTALLER_BIN", "openshift-install"),
            log_level: var("OCPD_LOG_LEVEL", "info"),
        })
    }

    /// Path the submitted install configuration is written to.
    pub fn install_config_path(&self) -> PathBuf {
        self.install_dir.join(INSTALL_CONFIG_FILE)
    }
}
