use axum::{body::Bytes, extract::State};

use ocpd_proto::ActionRequest;

use super::error::ApiError;
use crate::runner::DispatchError;
use crate::state::AppState;

/// `POST /action`
///
/// Acknowledges once the workflow is scheduled; the workflow itself runs in
/// the background.
pub async fn submit_action(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<String, ApiError> {
    let action: ActionRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::bad_request("invalid_action", format!("invalid action payload: {e}"))
    })?;

    match state.runner().dispatch(action.clone()).await {
        Ok(_handle) => Ok(format!(
            "Agent action received and saved successfully. Action is: {} and Version is: {}\n",
            action.deploy, action.cluster_version
        )),
        Err(DispatchError::Busy) => Err(ApiError::conflict(
            "busy",
            "a cluster workflow is already running; retry after it finishes",
        )),
    }
}
