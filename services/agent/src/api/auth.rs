//! Shared-token authorization.
//!
//! Runs as middleware ahead of every handler, so a rejected request never
//! reaches body extraction or any side effect.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

use ocpd_pki::tokens_match;
use ocpd_proto::AUTH_TOKEN_HEADER;

use super::error::ApiError;
use crate::state::AppState;

pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    // The token file can be rotated under a running agent.
    let expected = match tokio::fs::read_to_string(state.token_file()).await {
        Ok(token) => token,
        Err(e) => {
            error!(path = %state.token_file().display(), error = %e, "Cannot read token file");
            return Err(forbidden());
        }
    };

    if !tokens_match(expected.trim(), presented) {
        warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with invalid token"
        );
        return Err(forbidden());
    }

    Ok(next.run(request).await)
}

fn forbidden() -> ApiError {
    ApiError::forbidden("forbidden", "missing or invalid auth token")
}
