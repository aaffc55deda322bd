//! ocpdctl library.
//!
//! The binary is a thin clap layer over these modules:
//!
//! - [`client`]: the agent's HTTPS API behind the [`client::AgentApi`] trait
//! - [`controller`]: bounded install/destroy convergence loops
//! - [`provision`]: infrastructure apply/destroy and output resolution
//! - [`install_config`]: the installer configuration document
//! - [`inputs`]: pull secret, SSH key and region image for the registry host

pub mod client;
pub mod commands;
pub mod controller;
pub mod error;
pub mod inputs;
pub mod install_config;
pub mod output;
pub mod provision;
