//! HTTP API handlers and routing.

mod action;
mod auth;
mod data;
pub mod error;
mod status;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use ocpd_proto::paths;

use crate::state::AppState;

pub use data::DATA_ACCEPTED;

/// Create the agent router. Every route requires the shared token.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(paths::STATUS, get(status::get_status))
        .route(paths::DATA, post(data::submit_install_config))
        .route(paths::ACTION, post(action::submit_action))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
