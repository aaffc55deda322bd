//! The client against a real agent over TLS, trusting only the bootstrap CA.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{oneshot, watch};

use ocpd_agent::{
    api,
    runner::ClusterLifecycleRunner,
    state::AppState,
    store::{AgentStateStore, ProbeTarget},
    tls,
    workflow::{MockWorkflow, WorkflowCall},
};
use ocpd_pki::BootstrapBundle;
use ocpd_proto::{ActionRequest, AgentState};
use ocpdctl::client::{AgentApi, AgentClient, AgentError};

struct Agent {
    addr: SocketAddr,
    bundle: BootstrapBundle,
    store: Arc<AgentStateStore>,
    runner: ClusterLifecycleRunner,
    workflow: Arc<MockWorkflow>,
    dir: TempDir,
    shutdown: watch::Sender<bool>,
}

impl Agent {
    fn client(&self, token: &str) -> AgentClient {
        AgentClient::new("127.0.0.1", self.addr.port(), &self.bundle.ca_cert_pem, token).unwrap()
    }
}

async fn start_agent() -> Agent {
    tls::install_crypto_provider();

    let dir = TempDir::new().unwrap();
    let bundle = BootstrapBundle::mint().unwrap();
    let ca_cert = dir.path().join("ca.crt");
    let ca_key = dir.path().join("ca.key");
    let token_file = dir.path().join("agent-token");
    std::fs::write(&ca_cert, &bundle.ca_cert_pem).unwrap();
    std::fs::write(&ca_key, &bundle.ca_key_pem).unwrap();
    std::fs::write(&token_file, &bundle.token).unwrap();

    let tls_config = tls::server_tls_config(&ca_cert, &ca_key, &["127.0.0.1".to_string()])
        .await
        .unwrap();

    let store = Arc::new(AgentStateStore::new());
    let workflow = Arc::new(MockWorkflow::new());
    let runner = ClusterLifecycleRunner::new(workflow.clone());
    let state = AppState::new(
        Arc::clone(&store),
        runner.clone(),
        token_file,
        dir.path().join("cluster").join("install-config.yaml"),
    );

    let (shutdown, shutdown_rx) = watch::channel(false);
    let (bound_tx, bound_rx) = oneshot::channel();
    tokio::spawn(tls::serve(
        "127.0.0.1:0".parse().unwrap(),
        tls_config,
        api::create_router(state),
        shutdown_rx,
        Some(bound_tx),
    ));
    let addr = bound_rx.await.unwrap();

    Agent {
        addr,
        bundle,
        store,
        runner,
        workflow,
        dir,
        shutdown,
    }
}

#[tokio::test]
async fn status_config_and_action_round_trip() {
    let agent = start_agent().await;
    let client = agent.client(&agent.bundle.token);

    assert_eq!(client.status().await.unwrap(), AgentState::default());

    agent.store.record(ProbeTarget::Registry, true).await;
    assert!(client.status().await.unwrap().registry_health.is_healthy());

    client
        .submit_config(&json!({"apiVersion": "v1", "metadata": {"name": "ocpd-54321"}}))
        .await
        .unwrap();
    let written =
        std::fs::read_to_string(agent.dir.path().join("cluster").join("install-config.yaml"))
            .unwrap();
    assert!(written.contains("name: ocpd-54321"));

    client
        .submit_action(&ActionRequest::install("4.14.1").unwrap())
        .await
        .unwrap();

    for _ in 0..100 {
        if !agent.runner.is_busy() && !agent.workflow.calls().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        agent.workflow.calls().await,
        vec![WorkflowCall::Install("4.14.1".to_string())]
    );

    agent.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let agent = start_agent().await;
    let client = agent.client("not-the-token");

    let err = client.status().await.unwrap_err();
    assert!(matches!(err, AgentError::Unauthorized));
    assert!(!err.is_retryable());

    agent.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn untrusted_ca_is_a_transport_failure() {
    let agent = start_agent().await;
    let other = BootstrapBundle::mint().unwrap();
    let client =
        AgentClient::new("127.0.0.1", agent.addr.port(), &other.ca_cert_pem, &agent.bundle.token)
            .unwrap();

    let err = client.status().await.unwrap_err();
    assert!(matches!(err, AgentError::Transport(_)));

    agent.shutdown.send(true).unwrap();
}
