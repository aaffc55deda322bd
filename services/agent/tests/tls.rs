//! End-to-end: real HTTPS listener with a leaf issued from a fresh bootstrap CA.

use std::net::SocketAddr;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{oneshot, watch};

use ocpd_agent::{
    api, runner::ClusterLifecycleRunner, state::AppState, store::AgentStateStore, tls,
    workflow::MockWorkflow,
};
use ocpd_pki::BootstrapBundle;
use ocpd_proto::{AgentState, AUTH_TOKEN_HEADER};

struct Agent {
    addr: SocketAddr,
    bundle: BootstrapBundle,
    shutdown: watch::Sender<bool>,
    _dir: TempDir,
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

    let tls_config = tls::server_tls_config(
        &ca_cert,
        &ca_key,
        &["localhost".to_string(), "127.0.0.1".to_string()],
    )
    .await
    .unwrap();

    let state = AppState::new(
        Arc::new(AgentStateStore::new()),
        ClusterLifecycleRunner::new(Arc::new(MockWorkflow::new())),
        token_file,
        dir.path().join("install-config.yaml"),
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
        shutdown,
        _dir: dir,
    }
}

fn client_trusting(ca_pem: &str, agent: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve("localhost", agent)
        .tls_built_in_root_certs(false)
        .add_root_certificate(reqwest::Certificate::from_pem(ca_pem.as_bytes()).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn client_trusting_bootstrap_ca_reads_status() {
    let agent = start_agent().await;
    let client = client_trusting(&agent.bundle.ca_cert_pem, agent.addr);

    let url = format!("https://localhost:{}/status", agent.addr.port());
    let response = client
        .get(&url)
        .header(AUTH_TOKEN_HEADER, &agent.bundle.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let state: AgentState = response.json().await.unwrap();
    assert_eq!(state, AgentState::default());

    let response = client
        .get(&url)
        .header(AUTH_TOKEN_HEADER, "not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    agent.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn client_with_other_ca_is_rejected() {
    let agent = start_agent().await;
    let other = BootstrapBundle::mint().unwrap();
    let client = client_trusting(&other.ca_cert_pem, agent.addr);

    let result = client
        .get(format!("https://localhost:{}/status", agent.addr.port()))
        .header(AUTH_TOKEN_HEADER, &agent.bundle.token)
        .send()
        .await;
    assert!(result.is_err());

    agent.shutdown.send(true).unwrap();
}
