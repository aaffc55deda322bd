//! HTTPS client for the agent API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;

use ocpd_proto::{paths, ActionRequest, AgentState, AUTH_TOKEN_HEADER};

/// Failures talking to the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Network or TLS failure; the agent may simply not be up yet.
    #[error("agent unreachable: {0}")]
    Transport(String),

    /// The agent answered but the body could not be read or parsed.
    #[error("unreadable agent response: {0}")]
    InvalidResponse(String),

    #[error("agent rejected the auth token")]
    Unauthorized,

    /// The agent rejected our payload as malformed.
    #[error("agent rejected the request: {0}")]
    Protocol(String),

    #[error("agent is busy running a cluster workflow")]
    Busy,

    #[error("agent responded with {status}: {message}")]
    Status { status: u16, message: String },
}

impl AgentError {
    /// Whether the failure may clear up on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Transport(_) | AgentError::InvalidResponse(_) | AgentError::Status { .. }
        )
    }
}

/// Operations the controller needs from the agent.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn status(&self) -> Result<AgentState, AgentError>;

    /// Submit the installer configuration document.
    async fn submit_config(&self, document: &serde_json::Value) -> Result<(), AgentError>;

    async fn submit_action(&self, action: &ActionRequest) -> Result<(), AgentError>;
}

/// reqwest-backed [`AgentApi`].
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
}

impl AgentClient {
    /// Client for `https://<host>:<port>` trusting only the bootstrap CA.
    pub fn new(host: &str, port: u16, ca_cert_pem: &str, token: &str) -> Result<Self> {
        let ca = reqwest::Certificate::from_pem(ca_cert_pem.as_bytes())
            .context("Invalid CA certificate")?;

        let client = reqwest::Client::builder()
            .default_headers(auth_headers(token)?)
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("https://{host}:{port}"),
        })
    }

    /// Client against an arbitrary base URL with a caller-built transport.
    pub fn with_base_url(base_url: impl Into<String>, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(auth_headers(token)?)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<String, AgentError> {
        let response = self
            .client
            .post(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let response = check_status(response).await?;
        response
            .text()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }
}

fn auth_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(token).context("Invalid token format")?;
    value.set_sensitive(true);
    headers.insert(HeaderName::from_bytes(AUTH_TOKEN_HEADER.as_bytes())?, value);
    Ok(headers)
}

fn transport(e: reqwest::Error) -> AgentError {
    AgentError::Transport(e.to_string())
}

/// Map non-success responses onto [`AgentError`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => AgentError::Unauthorized,
        StatusCode::CONFLICT => AgentError::Busy,
        StatusCode::BAD_REQUEST => AgentError::Protocol(message),
        _ => AgentError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn status(&self) -> Result<AgentState, AgentError> {
        let response = self
            .client
            .get(self.url(paths::STATUS))
            .send()
            .await
            .map_err(transport)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }

    async fn submit_config(&self, document: &serde_json::Value) -> Result<(), AgentError> {
        let body = serde_json::to_vec(document).map_err(|e| AgentError::Protocol(e.to_string()))?;
        let ack = self.post(paths::DATA, body).await?;
        tracing::debug!(response = %ack.trim(), "Install configuration accepted");
        Ok(())
    }

    async fn submit_action(&self, action: &ActionRequest) -> Result<(), AgentError> {
        let body = serde_json::to_vec(action).map_err(|e| AgentError::Protocol(e.to_string()))?;
        let ack = self.post(paths::ACTION, body).await?;
        tracing::debug!(response = %ack.trim(), "Action accepted");
        Ok(())
    }
}
