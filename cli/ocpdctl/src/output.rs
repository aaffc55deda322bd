//! Output formatting for CLI commands.

use colored::Colorize;
use tabled::{Table, Tabled};

use ocpd_proto::AgentState;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

#[derive(Debug, Tabled)]
struct StatusRow {
    #[tabled(rename = "Agent")]
    agent: String,

    #[tabled(rename = "Registry")]
    registry: String,

    #[tabled(rename = "Cluster")]
    cluster: String,
}

fn status_table(agent: &str, state: &AgentState) -> Table {
    Table::new([StatusRow {
        agent: agent.to_string(),
        registry: state.registry_health.to_string(),
        cluster: state.cluster_status.to_string(),
    }])
}

/// Print the agent's state pair.
pub fn print_status(agent: &str, state: &AgentState, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", status_table(agent, state)),
        OutputFormat::Json => match serde_json::to_string_pretty(state) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{} {e}", "Error:".red().bold()),
        },
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_row_table() {
        let state = AgentState::from_observations(true, false);
        let table = status_table("ec2-1-2-3-4.compute.amazonaws.com", &state).to_string();
        for cell in ["Agent", "Registry", "Cluster", "Healthy", "DontExist"] {
            assert!(table.contains(cell), "missing {cell} in\n{table}");
        }
    }
}
