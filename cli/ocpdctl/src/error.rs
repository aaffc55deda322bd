//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

use crate::client::AgentError;
use crate::controller::ControllerError;
use crate::inputs::{supported_regions, InputError};

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No CA certificate at {path}")]
    MissingCaCert { path: String },

    #[error("Forced destroy was not confirmed")]
    NotConfirmed,
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(controller_err) = err.downcast_ref::<ControllerError>() {
        match controller_err {
            ControllerError::AgentUnavailable { guidance, .. } => {
                eprintln!("\n{}", guidance.to_string().trim_end().yellow());
            }
            ControllerError::Agent(agent_err) => print_agent_hint(agent_err),
            ControllerError::AlreadyInstalled => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `ocpdctl destroy-cluster` first to replace the existing cluster."
                        .yellow()
                );
            }
            ControllerError::DestroyTimedOut { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The cluster destroy may still be running. Check `ocpdctl status` and run `ocpdctl destroy` again."
                        .yellow()
                );
            }
            ControllerError::Teardown(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Re-run `ocpdctl destroy --force` once the provisioning error is fixed."
                        .yellow()
                );
            }
        }
    } else if let Some(agent_err) = err.downcast_ref::<AgentError>() {
        print_agent_hint(agent_err);
    } else if let Some(input_err) = err.downcast_ref::<InputError>() {
        match input_err {
            InputError::NotInitialized { .. } => eprintln!(
                "\n{}",
                "Hint: Run `ocpdctl init` to record the pull secret and public key paths.".yellow()
            ),
            InputError::UnsupportedRegion(_) => eprintln!(
                "\n{} {}",
                "Hint: Supported regions:".yellow(),
                supported_regions().join(", ")
            ),
            _ => {}
        }
    } else if let Some(CliError::MissingCaCert { .. }) = err.downcast_ref::<CliError>() {
        eprintln!(
            "\n{}",
            "Hint: Run ocpdctl from the directory the registry was installed from, or pass --ca-cert."
                .yellow()
        );
    }
}

fn print_agent_hint(err: &AgentError) {
    let hint = match err {
        AgentError::Unauthorized => {
            "Hint: The agent rejected the token. The action cannot be completed."
        }
        AgentError::Busy => {
            "Hint: A cluster workflow is already running on the agent. Wait for it to finish and retry."
        }
        AgentError::Protocol(_) => "Hint: The request was malformed; correct it and resubmit.",
        AgentError::Transport(_) => "Hint: Check that the registry host is running and reachable.",
        AgentError::InvalidResponse(_) | AgentError::Status { .. } => return,
    };
    eprintln!("\n{}", hint.yellow());
}
