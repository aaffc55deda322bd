//! Cluster install/destroy workflows.
//!
//! The workflows shell out to the installer tooling staged on the host and
//! can run for the better part of an hour. [`ScriptWorkflow`] is the real
//! implementation; [`MockWorkflow`] records calls for tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// Placeholder for the requested cluster version in the script template.
pub const CLUSTER_VERSION_PLACEHOLDER: &str = "$CLUSTER_VERSION";

/// Placeholder for the release channel in the script template.
pub const RELEASE_CHANNEL_PLACEHOLDER: &str = "$RELEASE_CHANNEL";

/// Workflow failures. None are retried; the operator re-runs the action.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read install script template {path}: {source}")]
    Template {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write install script {path}: {source}")]
    Script {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exited { program: String, status: String },

    #[error("{0}")]
    Other(String),
}

/// Lifecycle workflows the runner can invoke.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Install a cluster of the given version.
    async fn install(&self, cluster_version: &str) -> Result<(), WorkflowError>;

    /// Destroy the installed cluster.
    async fn destroy(&self) -> Result<(), WorkflowError>;
}

/// Release channel for a version: `stable-<major>.<minor>`.
///
/// Returns `None` when the version has fewer than two dot-separated parts.
pub fn release_channel(cluster_version: &str) -> Option<String> {
    let mut parts = cluster_version.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => Some(format!("stable-{major}.{minor}")),
        _ => None,
    }
}

/// Fill the template placeholders for one install.
pub fn render_install_script(template: &str, cluster_version: &str) -> String {
    let channel = release_channel(cluster_version).unwrap_or_default();
    template
        .replace(CLUSTER_VERSION_PLACEHOLDER, cluster_version)
        .replace(RELEASE_CHANNEL_PLACEHOLDER, &channel)
}

/// Runs the staged install script and the installer's destroy command.
#[derive(Debug, Clone)]
pub struct ScriptWorkflow {
    pub template: PathBuf,
    pub script: PathBuf,
    pub installer_bin: String,
    pub install_dir: PathBuf,
}

impl ScriptWorkflow {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            template: config.install_script_template.clone(),
            script: config.install_script.clone(),
            installer_bin: config.installer_bin.clone(),
            install_dir: config.install_dir.clone(),
        }
    }

    async fn write_script(&self, cluster_version: &str) -> Result<(), WorkflowError> {
        let template = tokio::fs::read_to_string(&self.template)
            .await
            .map_err(|source| WorkflowError::Template {
                path: self.template.display().to_string(),
                source,
            })?;

        let script = render_install_script(&template, cluster_version);
        let script_err = |source| WorkflowError::Script {
            path: self.script.display().to_string(),
            source,
        };
        tokio::fs::write(&self.script, script)
            .await
            .map_err(script_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.script, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(script_err)?;
        }

        debug!(script = %self.script.display(), "Rendered install script");
        Ok(())
    }
}

async fn run(program: &str, args: &[&str]) -> Result<(), WorkflowError> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| WorkflowError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(WorkflowError::Exited {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

#[async_trait]
impl Workflow for ScriptWorkflow {
    async fn install(&self, cluster_version: &str) -> Result<(), WorkflowError> {
        self.write_script(cluster_version).await?;

        info!(
            cluster_version,
            script = %self.script.display(),
            "Running cluster installation script"
        );
        let script = self.script.display().to_string();
        run("bash", &[&script]).await
    }

    async fn destroy(&self) -> Result<(), WorkflowError> {
        let install_dir = self.install_dir.display().to_string();
        info!(installer = %self.installer_bin, dir = %install_dir, "Running cluster destroy");

        run(
            &self.installer_bin,
            &["destroy", "cluster", "--dir", &install_dir, "--log-level", "debug"],
        )
        .await?;

        match tokio::fs::remove_file(&self.script).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkflowError::Script {
                path: self.script.display().to_string(),
                source,
            }),
        }
    }
}

/// A workflow invocation recorded by [`MockWorkflow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowCall {
    Install(String),
    Destroy,
}

/// Mock workflow for testing and development.
#[derive(Default)]
pub struct MockWorkflow {
    calls: Mutex<Vec<WorkflowCall>>,
    started: AtomicU32,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl MockWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose every run fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// A mock whose runs block until the returned handle is notified.
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mock = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (mock, gate)
    }

    /// Calls that have completed, in order.
    pub async fn calls(&self) -> Vec<WorkflowCall> {
        self.calls.lock().await.clone()
    }

    /// Number of runs that have started, including ones still in flight.
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    async fn record(&self, call: WorkflowCall) -> Result<(), WorkflowError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        info!(call = ?call, "[MOCK] Running workflow");

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.calls.lock().await.push(call);
        if self.fail {
            return Err(WorkflowError::Other(
                "mock workflow configured to fail".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Workflow for MockWorkflow {
    async fn install(&self, cluster_version: &str) -> Result<(), WorkflowError> {
        self.record(WorkflowCall::Install(cluster_version.to_string()))
            .await
    }

    async fn destroy(&self) -> Result<(), WorkflowError> {
        self.record(WorkflowCall::Destroy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("4.14.1", Some("stable-4.14"))]
    #[case("4.15", Some("stable-4.15"))]
    #[case("4", None)]
    #[case("", None)]
    fn test_release_channel(#[case] version: &str, #[case] expected: Option<&str>) {
        assert_eq!(release_channel(version).as_deref(), expected);
    }

    #[test]
    fn test_render_install_script() {
        let template = "VERSION=$CLUSTER_VERSION\nCHANNEL=$RELEASE_CHANNEL\necho $CLUSTER_VERSION\n";
        let rendered = render_install_script(template, "4.14.1");
        assert_eq!(
            rendered,
            "VERSION=4.14.1\nCHANNEL=stable-4.14\necho 4.14.1\n"
        );
    }

    fn workflow_in(dir: &TempDir, template: &str) -> ScriptWorkflow {
        let template_path = dir.path().join("install.sh.template");
        std::fs::write(&template_path, template).unwrap();
        ScriptWorkflow {
            template: template_path,
            script: dir.path().join("install.sh"),
            installer_bin: "false".to_string(),
            install_dir: dir.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_install_renders_and_runs_script() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let workflow = workflow_in(
            &dir,
            &format!("echo $CLUSTER_VERSION $RELEASE_CHANNEL > {}\n", out.display()),
        );

        workflow.install("4.14.1").await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "4.14.1 stable-4.14");
        assert!(workflow.script.exists());
    }

    #[tokio::test]
    async fn test_install_script_failure() {
        let dir = TempDir::new().unwrap();
        let workflow = workflow_in(&dir, "exit 3\n");

        let err = workflow.install("4.14.1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Exited { .. }));
    }

    #[tokio::test]
    async fn test_install_missing_template() {
        let dir = TempDir::new().unwrap();
        let workflow = ScriptWorkflow {
            template: dir.path().join("missing.template"),
            script: dir.path().join("install.sh"),
            installer_bin: "true".to_string(),
            install_dir: dir.path().to_path_buf(),
        };

        let err = workflow.install("4.14.1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Template { .. }));
        assert!(!workflow.script.exists());
    }

    #[tokio::test]
    async fn test_destroy_removes_script() {
        let dir = TempDir::new().unwrap();
        let mut workflow = workflow_in(&dir, "true\n");
        workflow.installer_bin = "true".to_string();
        std::fs::write(&workflow.script, "stale").unwrap();

        workflow.destroy().await.unwrap();
        assert!(!workflow.script.exists());
    }

    #[tokio::test]
    async fn test_destroy_failure_keeps_script() {
        let dir = TempDir::new().unwrap();
        let workflow = workflow_in(&dir, "true\n");
        std::fs::write(&workflow.script, "stale").unwrap();

        let err = workflow.destroy().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Exited { .. }));
        assert!(workflow.script.exists());
    }

    #[tokio::test]
    async fn test_mock_workflow_records_calls() {
        let mock = MockWorkflow::new();
        mock.install("4.14.1").await.unwrap();
        mock.destroy().await.unwrap();

        assert_eq!(
            mock.calls().await,
            vec![WorkflowCall::Install("4.14.1".into()), WorkflowCall::Destroy]
        );
        assert_eq!(mock.started(), 2);
    }

    #[tokio::test]
    async fn test_mock_workflow_failing() {
        let mock = MockWorkflow::failing();
        assert!(mock.install("4.14.1").await.is_err());
    }
}
