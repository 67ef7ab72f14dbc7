use crate::config::{DEFAULT_CHAIN, DEFAULT_CONTAINER, DEFAULT_MARKER, DEFAULT_PROBE_URL};
use crate::runtime::RuntimeKind;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "netlock")]
#[command(about = "Toggle outbound network isolation for a containerized web UI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Name of the workload container
    #[arg(short, long, global = true, default_value = DEFAULT_CONTAINER)]
    pub container: String,

    /// Marker tagged onto both firewall rules so they can be found and
    /// removed as a set
    #[arg(short, long, global = true, default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Firewall chain holding the rule pair
    #[arg(long, global = true, default_value = DEFAULT_CHAIN)]
    pub chain: String,

    /// Container engine (docker or podman; auto-detected if omitted)
    #[arg(short, long, global = true)]
    pub runtime: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the isolation rule pair for the workload's current address
    Enable {
        /// Endpoint the verification probe tries to reach from inside the
        /// workload
        #[arg(long, default_value = DEFAULT_PROBE_URL)]
        probe_url: String,

        /// Skip the post-enable verification probe
        #[arg(long)]
        no_probe: bool,
    },

    /// Remove every rule carrying the marker
    Disable,

    /// Report workload state and rule presence without changing anything
    Status {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    pub fn parse_runtime(runtime: &str) -> Result<RuntimeKind, String> {
        match runtime.to_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "podman" | "pod" => Ok(RuntimeKind::Podman),
            _ => Err(format!(
                "Invalid runtime '{}'. Supported: docker, podman",
                runtime
            )),
        }
    }
}
