//! ocpd agent
//!
//! Runs on the registry host next to the mirror registry and reports what it
//! sees to the operator's `ocpdctl`:
//!
//! - **Probes**: two independent loops observe registry reachability and the
//!   cluster installation markers every few seconds
//! - **State store**: holds the observed pair, always updated as a unit
//! - **API**: token-authenticated HTTPS endpoints for status, install
//!   configuration and lifecycle actions
//! - **Runner**: executes install/destroy workflows off the request path, one
//!   at a time

pub mod api;
pub mod config;
pub mod probes;
pub mod runner;
pub mod state;
pub mod store;
pub mod tls;
pub mod workflow;
