//! Cluster lifecycle runner.
//!
//! Accepts one action at a time. A dispatch takes the single-flight guard
//! before anything else; while a workflow holds it, further dispatches are
//! rejected and the stored action is left untouched.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ocpd_proto::{ActionRequest, Deploy};

use crate::workflow::Workflow;

/// How the last run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Succeeded,
    Failed(String),
    /// The action was not a combination the runner acts on.
    Skipped,
}

/// Dispatch rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("a cluster workflow is already running")]
    Busy,
}

#[derive(Clone)]
pub struct ClusterLifecycleRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    workflow: Arc<dyn Workflow>,
    in_flight: Arc<Mutex<()>>,
    last_action: RwLock<Option<ActionRequest>>,
    last_outcome: RwLock<Option<WorkflowOutcome>>,
}

impl ClusterLifecycleRunner {
    pub fn new(workflow: Arc<dyn Workflow>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                workflow,
                in_flight: Arc::new(Mutex::new(())),
                last_action: RwLock::new(None),
                last_outcome: RwLock::new(None),
            }),
        }
    }

    /// Store the action and start its workflow in the background.
    ///
    /// Returns as soon as the workflow is scheduled. The handle resolves to
    /// the outcome and is only awaited by tests.
    pub async fn dispatch(
        &self,
        action: ActionRequest,
    ) -> Result<JoinHandle<WorkflowOutcome>, DispatchError> {
        let guard = Arc::clone(&self.inner.in_flight)
            .try_lock_owned()
            .map_err(|_| DispatchError::Busy)?;

        info!(deploy = %action.deploy, cluster_version = %action.cluster_version, "Action accepted");
        *self.inner.last_action.write().await = Some(action.clone());

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            let outcome = inner.execute(&action).await;
            *inner.last_outcome.write().await = Some(outcome.clone());
            drop(guard);
            outcome
        }))
    }

    /// Whether a workflow currently holds the single-flight guard.
    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.try_lock().is_err()
    }

    pub async fn last_action(&self) -> Option<ActionRequest> {
        self.inner.last_action.read().await.clone()
    }

    pub async fn last_outcome(&self) -> Option<WorkflowOutcome> {
        self.inner.last_outcome.read().await.clone()
    }
}

impl RunnerInner {
    async fn execute(&self, action: &ActionRequest) -> WorkflowOutcome {
        if let Err(e) = action.validate() {
            warn!(error = %e, "Ignoring action");
            return WorkflowOutcome::Skipped;
        }

        let result = match action.deploy {
            Deploy::Install => self.workflow.install(&action.cluster_version).await,
            Deploy::Destroy => self.workflow.destroy().await,
        };

        match result {
            Ok(()) => {
                info!(deploy = %action.deploy, "Cluster workflow finished");
                WorkflowOutcome::Succeeded
            }
            Err(e) => {
                error!(
                    deploy = %action.deploy,
                    error = %e,
                    "Cluster workflow failed; manual follow-up required"
                );
                WorkflowOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{MockWorkflow, WorkflowCall};
    use ocpd_proto::VERSION_NOT_APPLICABLE;

    #[tokio::test]
    async fn test_install_runs_once() {
        let mock = Arc::new(MockWorkflow::new());
        let runner = ClusterLifecycleRunner::new(mock.clone());

        let handle = runner
            .dispatch(ActionRequest::install("4.14.1").unwrap())
            .await
            .unwrap();
        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Succeeded);

        assert_eq!(
            mock.calls().await,
            vec![WorkflowCall::Install("4.14.1".into())]
        );
        assert_eq!(runner.last_outcome().await, Some(WorkflowOutcome::Succeeded));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_destroy_runs() {
        let mock = Arc::new(MockWorkflow::new());
        let runner = ClusterLifecycleRunner::new(mock.clone());

        let handle = runner.dispatch(ActionRequest::destroy()).await.unwrap();
        handle.await.unwrap();
        assert_eq!(mock.calls().await, vec![WorkflowCall::Destroy]);
    }

    #[tokio::test]
    async fn test_invalid_combination_is_noop() {
        let mock = Arc::new(MockWorkflow::new());
        let runner = ClusterLifecycleRunner::new(mock.clone());

        let action = ActionRequest {
            deploy: Deploy::Destroy,
            cluster_version: "4.14.1".into(),
        };
        let handle = runner.dispatch(action.clone()).await.unwrap();

        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Skipped);
        assert_eq!(mock.started(), 0);
        assert_eq!(runner.last_action().await, Some(action));

        let install_na = ActionRequest {
            deploy: Deploy::Install,
            cluster_version: VERSION_NOT_APPLICABLE.into(),
        };
        let handle = runner.dispatch(install_na).await.unwrap();
        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Skipped);
        assert_eq!(mock.started(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let runner = ClusterLifecycleRunner::new(Arc::new(MockWorkflow::failing()));

        let handle = runner.dispatch(ActionRequest::destroy()).await.unwrap();
        assert!(matches!(handle.await.unwrap(), WorkflowOutcome::Failed(_)));
        assert!(matches!(
            runner.last_outcome().await,
            Some(WorkflowOutcome::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_second_dispatch_rejected_while_running() {
        let (mock, gate) = MockWorkflow::gated();
        let mock = Arc::new(mock);
        let runner = ClusterLifecycleRunner::new(mock.clone());

        let first = ActionRequest::install("4.14.1").unwrap();
        let handle = runner.dispatch(first.clone()).await.unwrap();
        assert!(runner.is_busy());

        let second = runner.dispatch(ActionRequest::destroy()).await;
        assert_eq!(second.unwrap_err(), DispatchError::Busy);
        assert_eq!(runner.last_action().await, Some(first));

        gate.notify_one();
        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Succeeded);
        assert_eq!(mock.started(), 1);

        // guard released; the next dispatch is accepted
        let handle = runner.dispatch(ActionRequest::destroy()).await.unwrap();
        gate.notify_one();
        handle.await.unwrap();
        assert_eq!(
            mock.calls().await,
            vec![WorkflowCall::Install("4.14.1".into()), WorkflowCall::Destroy]
        );
    }
}
