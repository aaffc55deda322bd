use axum::{extract::State, Json};

use ocpd_proto::AgentState;

use crate::state::AppState;

/// `GET /status`
pub async fn get_status(State(state): State<AppState>) -> Json<AgentState> {
    Json(state.store().snapshot().await)
}
