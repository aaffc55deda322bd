//! Error types for wire payload construction.

use thiserror::Error;

/// Errors raised when building or validating protocol payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// An install action was requested without a cluster version.
    #[error("install action requires a cluster version")]
    MissingClusterVersion,

    /// The deploy/version pair is not one the agent will act on.
    #[error("invalid action: deploy={deploy}, cluster_version='{cluster_version}'")]
    InvalidAction {
        deploy: String,
        cluster_version: String,
    },
}
