//! Reconciliation controller.
//!
//! Drives the agent from what it reports toward what the operator asked for.
//! Calls are strictly sequential and every loop is bounded by a
//! [`RetryPolicy`]; a failed or ambiguous probe never counts as progress.
//!
//! Install decision table, applied per attempt:
//!
//! | Observed                 | Action                                        |
//! |--------------------------|-----------------------------------------------|
//! | Healthy, DontExist       | submit configuration, then Install; done      |
//! | Healthy, Exists          | abort: already installed                      |
//! | Unhealthy or unreachable | retry until the budget runs out, then guidance |
//!
//! The configuration is submitted at most once per install. Once it is
//! accepted, later attempts only resend the action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use ocpd_proto::{ActionRequest, AgentState, ClusterStatus, RegistryHealth};
use ocpd_reconcile::{
    Attempt, ReconcileError, RetryPolicy, Step, DEFAULT_DESTROY_ATTEMPTS, DEFAULT_DESTROY_DELAY,
    DEFAULT_INSTALL_ATTEMPTS, DEFAULT_INSTALL_DELAY, DEFAULT_WARMUP,
};

use crate::client::{AgentApi, AgentError};
use crate::provision::{DeploymentState, ProvisionError, Provisioner};

/// Timing for the controller loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Wait after provisioning before the first status probe.
    pub warmup: Duration,
    pub install: RetryPolicy,
    pub destroy: RetryPolicy,
    /// Resending an action after a transient failure.
    pub submit: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            install: RetryPolicy::new(DEFAULT_INSTALL_ATTEMPTS, DEFAULT_INSTALL_DELAY),
            destroy: RetryPolicy::new(DEFAULT_DESTROY_ATTEMPTS, DEFAULT_DESTROY_DELAY),
            submit: RetryPolicy::new(DEFAULT_INSTALL_ATTEMPTS, DEFAULT_INSTALL_DELAY),
        }
    }
}

/// Remediation text for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Guidance(pub Vec<String>);

impl Guidance {
    /// Next steps when the agent cannot be reached, based on what the
    /// provisioning state says exists.
    pub fn agent_unreachable(state: &DeploymentState) -> Self {
        let lines: Vec<&str> = match state {
            DeploymentState::RegistryAndClusterDependencies => vec![
                "The registry host and cluster dependencies are provisioned.",
                "Log in to the registry host and check the cluster install directory (/ec2-user/cluster).",
                "If a cluster exists, destroy it there with `openshift-install destroy cluster --dir /ec2-user/cluster` to avoid orphaned cloud resources.",
            ],
            DeploymentState::RegistryOnly => vec![
                "A registry host is provisioned but its agent is not answering.",
                "If you just deployed, wait about 5 minutes and try again.",
                "To tear the infrastructure down without the agent, run `ocpdctl destroy --force`.",
                "A cluster provisioned from that host must be destroyed manually first; use --force with care.",
            ],
            DeploymentState::NotProvisioned => vec!["No provisioned infrastructure was found."],
            DeploymentState::Unknown(_) => vec![
                "The provisioning state file is missing or unreadable.",
                "If generated variable files remain in the work directory, cloud resources may be orphaned.",
            ],
        };
        let mut lines: Vec<String> = lines.into_iter().map(String::from).collect();
        if let DeploymentState::Unknown(reason) = state {
            lines.push(format!("State file: {reason}"));
        }
        Self(lines)
    }
}

impl std::fmt::Display for Guidance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.0 {
            writeln!(f, "--> {line}")?;
        }
        Ok(())
    }
}

/// Terminal controller outcomes.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a cluster is already installed on the registry host")]
    AlreadyInstalled,

    #[error("agent or registry not ready after {attempts} attempts")]
    AgentUnavailable { attempts: u32, guidance: Guidance },

    #[error(transparent)]
    Agent(AgentError),

    #[error("cluster still present after {attempts} checks; infrastructure left in place")]
    DestroyTimedOut { attempts: u32 },

    #[error("infrastructure teardown failed: {0}")]
    Teardown(#[source] ProvisionError),
}

/// What a destroy-cluster run found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyClusterOutcome {
    /// A Destroy action was accepted; the agent runs it in the background.
    Requested,
    NothingToDestroy,
}

#[derive(Default)]
struct InstallProgress {
    config_accepted: AtomicBool,
    action_sent: AtomicBool,
}

/// Bounded convergence loops against one agent.
pub struct ReconciliationController<A, P> {
    agent: A,
    provisioner: P,
    config: ControllerConfig,
}

/// Wait for the registry and agent to boot after provisioning.
pub async fn warm_up(config: &ControllerConfig) {
    if config.warmup.is_zero() {
        return;
    }
    info!(
        warmup_secs = config.warmup.as_secs(),
        "Waiting for the registry and agent to come up"
    );
    tokio::time::sleep(config.warmup).await;
}

impl<A: AgentApi, P: Provisioner> ReconciliationController<A, P> {
    pub fn new(agent: A, provisioner: P, config: ControllerConfig) -> Self {
        Self {
            agent,
            provisioner,
            config,
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    fn unavailable(&self, attempts: u32) -> ControllerError {
        ControllerError::AgentUnavailable {
            attempts,
            guidance: Guidance::agent_unreachable(&self.provisioner.deployment_state()),
        }
    }

    /// Probe once.
    pub async fn status(&self) -> Result<AgentState, ControllerError> {
        self.agent.status().await.map_err(|e| {
            if e.is_retryable() {
                warn!(error = %e, "Agent status unavailable");
                self.unavailable(1)
            } else {
                ControllerError::Agent(e)
            }
        })
    }

    /// Run the install loop: submit configuration and an Install action once
    /// the registry is healthy and no cluster exists.
    pub async fn install(
        &self,
        action: &ActionRequest,
        document: &serde_json::Value,
    ) -> Result<(), ControllerError> {
        let progress = InstallProgress::default();
        let result = self
            .config
            .install
            .run(|attempt| self.install_step(attempt, action, document, &progress))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(ReconcileError::Aborted(e)) => Err(e),
            Err(ReconcileError::Exhausted { attempts }) => {
                warn!(attempts, "Registry not ready, giving up");
                Err(self.unavailable(attempts))
            }
        }
    }

    async fn install_step(
        &self,
        attempt: Attempt,
        action: &ActionRequest,
        document: &serde_json::Value,
        progress: &InstallProgress,
    ) -> Step<(), ControllerError> {
        if !progress.config_accepted.load(Ordering::SeqCst) {
            let state = match self.agent.status().await {
                Ok(state) => state,
                Err(e) => return retry_or_abort(attempt, e),
            };

            match (state.registry_health, state.cluster_status) {
                (RegistryHealth::Healthy, ClusterStatus::DontExist) => {
                    info!(attempt = %attempt, "Registry healthy and no cluster present, submitting install");
                    if let Err(e) = self.agent.submit_config(document).await {
                        return retry_or_abort(attempt, e);
                    }
                    progress.config_accepted.store(true, Ordering::SeqCst);
                }
                (RegistryHealth::Healthy, ClusterStatus::Exists) => {
                    return Step::Abort(ControllerError::AlreadyInstalled);
                }
                (RegistryHealth::Unhealthy, _) => {
                    info!(attempt = %attempt, "Registry is not yet ready");
                    return Step::Retry;
                }
            }
        }

        self.action_step(attempt, action, &progress.action_sent).await
    }

    /// Send `action` once, treating a busy agent after an unanswered earlier
    /// send as acceptance of that send.
    async fn action_step(
        &self,
        attempt: Attempt,
        action: &ActionRequest,
        sent: &AtomicBool,
    ) -> Step<(), ControllerError> {
        let resend = sent.swap(true, Ordering::SeqCst);

        match self.agent.submit_action(action).await {
            Ok(()) => {
                info!(
                    deploy = %action.deploy,
                    cluster_version = %action.cluster_version,
                    "Action accepted by agent"
                );
                Step::Done(())
            }
            Err(AgentError::Busy) if resend => {
                warn!(
                    attempt = %attempt,
                    deploy = %action.deploy,
                    "Agent busy after an unanswered send, assuming the action was accepted"
                );
                Step::Done(())
            }
            Err(e) => retry_or_abort(attempt, e),
        }
    }

    /// Send `action`, retrying transient failures under the submit policy.
    async fn submit_action(&self, action: &ActionRequest) -> Result<(), ControllerError> {
        let sent = AtomicBool::new(false);
        let result = self
            .config
            .submit
            .run(|attempt| self.action_step(attempt, action, &sent))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(ReconcileError::Aborted(e)) => Err(e),
            Err(ReconcileError::Exhausted { attempts }) => Err(self.unavailable(attempts)),
        }
    }

    /// Destroy any cluster through the agent, wait for it to disappear, then
    /// tear down the infrastructure exactly once.
    ///
    /// Issues one initial probe plus at most `destroy.max_attempts` polls.
    pub async fn destroy(&self) -> Result<(), ControllerError> {
        let state = self.status().await?;

        if !state.cluster_status.exists() {
            info!("No cluster present, destroying only the registry");
            return self.teardown().await;
        }

        info!("Cluster present, requesting destroy");
        self.submit_action(&ActionRequest::destroy()).await?;

        let policy = self.config.destroy;
        tokio::time::sleep(policy.delay).await;

        let result = policy.run(|attempt| self.destroy_step(attempt)).await;
        match result {
            Ok(()) => self.teardown().await,
            Err(ReconcileError::Aborted(e)) => Err(e),
            Err(ReconcileError::Exhausted { attempts }) => {
                Err(ControllerError::DestroyTimedOut { attempts })
            }
        }
    }

    async fn destroy_step(&self, attempt: Attempt) -> Step<(), ControllerError> {
        match self.agent.status().await {
            Ok(state) if !state.cluster_status.exists() => Step::Done(()),
            Ok(_) => {
                info!(attempt = %attempt, "Cluster is still being destroyed");
                Step::Retry
            }
            Err(e) => retry_or_abort(attempt, e),
        }
    }

    /// Tear down infrastructure without consulting the agent.
    pub async fn teardown(&self) -> Result<(), ControllerError> {
        info!("Destroying the infrastructure");
        self.provisioner
            .destroy()
            .await
            .map_err(ControllerError::Teardown)
    }

    /// Request a cluster destroy but keep the registry.
    pub async fn destroy_cluster(&self) -> Result<DestroyClusterOutcome, ControllerError> {
        let state = self.status().await?;
        if !state.cluster_status.exists() {
            return Ok(DestroyClusterOutcome::NothingToDestroy);
        }

        self.submit_action(&ActionRequest::destroy()).await?;
        Ok(DestroyClusterOutcome::Requested)
    }
}

fn retry_or_abort<T>(attempt: Attempt, e: AgentError) -> Step<T, ControllerError> {
    if e.is_retryable() {
        warn!(attempt = %attempt, error = %e, "Agent call failed");
        Step::Retry
    } else {
        Step::Abort(ControllerError::Agent(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = ControllerConfig::default();
        assert_eq!(config.warmup, Duration::from_secs(300));
        assert_eq!(config.install.max_attempts, 10);
        assert_eq!(config.install.delay, Duration::from_secs(10));
        assert_eq!(config.destroy.delay, Duration::from_secs(120));
        assert_eq!(config.submit, config.install);
    }

    #[test]
    fn test_guidance_tracks_deployment_state() {
        let registry = Guidance::agent_unreachable(&DeploymentState::RegistryOnly);
        assert!(registry.0.iter().any(|l| l.contains("--force")));

        let both = Guidance::agent_unreachable(&DeploymentState::RegistryAndClusterDependencies);
        assert!(both.0.iter().any(|l| l.contains("openshift-install destroy cluster")));

        let unknown = Guidance::agent_unreachable(&DeploymentState::Unknown("gone".into()));
        assert!(unknown.to_string().contains("State file: gone"));
    }
}
