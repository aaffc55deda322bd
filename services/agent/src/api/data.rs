//! Install configuration submission.
//!
//! The document is opaque here: it is converted from JSON to the installer's
//! YAML and written over any previous submission. Nothing is installed.

use axum::{body::Bytes, extract::State};
use tracing::{error, info};

use super::error::ApiError;
use crate::state::AppState;

pub const DATA_ACCEPTED: &str = "Data received and saved successfully";

/// `POST /data`
pub async fn submit_install_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let document: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("invalid_json", format!("invalid JSON data: {e}")))?;

    if !document.is_object() {
        return Err(ApiError::bad_request(
            "invalid_document",
            "install configuration must be a JSON object",
        ));
    }

    let yaml = serde_yaml::to_string(&document).map_err(|e| {
        error!(error = %e, "Cannot convert install configuration to YAML");
        ApiError::internal("yaml_conversion_failed", "error converting to YAML")
    })?;

    let path = state.install_config_path();
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!(path = %parent.display(), error = %e, "Cannot create install directory");
            return Err(ApiError::internal("write_failed", "error writing file"));
        }
    }
    tokio::fs::write(path, yaml).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Cannot write install configuration");
        ApiError::internal("write_failed", "error writing file")
    })?;

    info!(path = %path.display(), "Install configuration saved");
    Ok(DATA_ACCEPTED)
}
