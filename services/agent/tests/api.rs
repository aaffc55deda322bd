use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use ocpd_agent::{
    api,
    runner::ClusterLifecycleRunner,
    state::AppState,
    store::{AgentStateStore, ProbeTarget},
    workflow::{MockWorkflow, WorkflowCall},
};
use ocpd_proto::{AgentState, AUTH_TOKEN_HEADER};

const TOKEN: &str = "kR3n8m2QpV0xZ7tYc1LwHs5aDf9gJe4u6iOb2NqTvXy";

struct Fixture {
    app: Router,
    store: Arc<AgentStateStore>,
    runner: ClusterLifecycleRunner,
    mock: Arc<MockWorkflow>,
    install_config: PathBuf,
    token_file: PathBuf,
    _dir: TempDir,
}

fn fixture_with(mock: MockWorkflow) -> Fixture {
    let dir = TempDir::new().unwrap();
    let token_file = dir.path().join("agent-token");
    std::fs::write(&token_file, format!("{TOKEN}\n")).unwrap();
    let install_config = dir.path().join("cluster").join("install-config.yaml");

    let store = Arc::new(AgentStateStore::new());
    let mock = Arc::new(mock);
    let runner = ClusterLifecycleRunner::new(mock.clone());
    let state = AppState::new(
        Arc::clone(&store),
        runner.clone(),
        token_file.clone(),
        install_config.clone(),
    );

    Fixture {
        app: api::create_router(state),
        store,
        runner,
        mock,
        install_config,
        token_file,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(MockWorkflow::new())
}

fn request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTH_TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn status_reports_default_before_probes() {
    let fx = fixture();
    let (status, body) = send(&fx.app, request(Method::GET, "/status", Some(TOKEN), "")).await;

    assert_eq!(status, StatusCode::OK);
    let state: AgentState = serde_json::from_slice(&body).unwrap();
    assert_eq!(state, AgentState::default());
}

#[tokio::test]
async fn status_reflects_store() {
    let fx = fixture();
    fx.store.record(ProbeTarget::Registry, true).await;
    fx.store.record(ProbeTarget::Cluster, true).await;

    let (status, body) = send(&fx.app, request(Method::GET, "/status", Some(TOKEN), "")).await;
    assert_eq!(status, StatusCode::OK);
    let raw: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        raw,
        json!({"RegistryHealth": "Healthy", "ClusterStatus": "Exists"})
    );
}

#[tokio::test]
async fn missing_or_wrong_token_is_forbidden() {
    let fx = fixture();

    for token in [None, Some(""), Some("wrong-token")] {
        let (status, body) = send(&fx.app, request(Method::GET, "/status", token, "")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let problem: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem["code"], "forbidden");
    }
}

#[tokio::test]
async fn unauthorized_requests_have_no_side_effects() {
    let fx = fixture();

    let config = json!({"apiVersion": "v1", "metadata": {"name": "disconnected-12345"}});
    let (status, _) = send(
        &fx.app,
        request(Method::POST, "/data", Some("wrong"), &config.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!fx.install_config.exists());

    let action = r#"{"Deploy":"Install","ClusterVersion":"4.14.1"}"#;
    let (status, _) = send(&fx.app, request(Method::POST, "/action", None, action)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(fx.runner.last_action().await, None);
    assert_eq!(fx.mock.started(), 0);
}

#[tokio::test]
async fn token_file_is_reread_per_request() {
    let fx = fixture();
    let (status, _) = send(&fx.app, request(Method::GET, "/status", Some(TOKEN), "")).await;
    assert_eq!(status, StatusCode::OK);

    std::fs::write(&fx.token_file, "rotated").unwrap();

    let (status, _) = send(&fx.app, request(Method::GET, "/status", Some(TOKEN), "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&fx.app, request(Method::GET, "/status", Some("rotated"), "")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unreadable_token_file_fails_closed() {
    let fx = fixture();
    std::fs::remove_file(&fx.token_file).unwrap();

    let (status, _) = send(&fx.app, request(Method::GET, "/status", Some(TOKEN), "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn data_is_converted_to_yaml_and_overwritten() {
    let fx = fixture();

    let first = json!({"apiVersion": "v1", "platform": {"aws": {"region": "us-east-1"}}});
    let (status, body) = send(
        &fx.app,
        request(Method::POST, "/data", Some(TOKEN), &first.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, api::DATA_ACCEPTED.as_bytes());

    let written: Value =
        serde_yaml::from_str(&std::fs::read_to_string(&fx.install_config).unwrap()).unwrap();
    assert_eq!(written, first);

    let second = json!({"apiVersion": "v1", "platform": {"aws": {"region": "eu-west-1"}}});
    let (status, _) = send(
        &fx.app,
        request(Method::POST, "/data", Some(TOKEN), &second.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let written: Value =
        serde_yaml::from_str(&std::fs::read_to_string(&fx.install_config).unwrap()).unwrap();
    assert_eq!(written["platform"]["aws"]["region"], "eu-west-1");
    assert_eq!(fx.mock.started(), 0);
}

#[tokio::test]
async fn malformed_data_is_bad_request() {
    let fx = fixture();

    for body in ["{not json", "[1, 2, 3]", "\"scalar\""] {
        let (status, _) = send(&fx.app, request(Method::POST, "/data", Some(TOKEN), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
    assert!(!fx.install_config.exists());
}

#[tokio::test]
async fn action_is_acknowledged_and_runs_in_background() {
    let fx = fixture();

    let (status, body) = send(
        &fx.app,
        request(
            Method::POST,
            "/action",
            Some(TOKEN),
            r#"{"Deploy":"Install","ClusterVersion":"4.14.1"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let message = String::from_utf8(body).unwrap();
    assert!(message.contains("Action is: Install and Version is: 4.14.1"));

    for _ in 0..100 {
        if !fx.mock.calls().await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(
        fx.mock.calls().await,
        vec![WorkflowCall::Install("4.14.1".into())]
    );
}

#[tokio::test]
async fn malformed_action_is_bad_request() {
    let fx = fixture();

    for body in [
        "",
        r#"{"Deploy":"Upgrade","ClusterVersion":"4.14.1"}"#,
        r#"{"Deploy":"Install"}"#,
    ] {
        let (status, _) = send(&fx.app, request(Method::POST, "/action", Some(TOKEN), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
    assert_eq!(fx.runner.last_action().await, None);
}

#[tokio::test]
async fn concurrent_action_is_rejected_as_busy() {
    let (mock, gate) = MockWorkflow::gated();
    let fx = fixture_with(mock);

    let install = r#"{"Deploy":"Install","ClusterVersion":"4.14.1"}"#;
    let destroy = r#"{"Deploy":"Destroy","ClusterVersion":"N/A"}"#;

    let (status, _) = send(&fx.app, request(Method::POST, "/action", Some(TOKEN), install)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(&fx.app, request(Method::POST, "/action", Some(TOKEN), destroy)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let problem: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(problem["code"], "busy");

    let stored = fx.runner.last_action().await.unwrap();
    assert_eq!(stored.cluster_version, "4.14.1");

    gate.notify_one();
    for _ in 0..100 {
        if !fx.runner.is_busy() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(fx.mock.started(), 1);
}
