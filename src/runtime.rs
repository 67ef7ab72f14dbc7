use crate::error::{NetlockError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub mod docker;
pub mod podman;

/// Running-state and current address of the workload, resolved fresh on
/// every invocation (the engine may hand out a different address after a
/// restart, so this is never cached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadState {
    pub running: bool,
    pub address: Option<Ipv4Addr>,
}

impl WorkloadState {
    pub fn stopped() -> Self {
        Self {
            running: false,
            address: None,
        }
    }
}

/// Outcome of a command executed inside the workload. A nonzero exit is data
/// here, not an error: the connectivity probe classifies by exit code.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Client interface over the container manager.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Query whether the named workload is running and what address the
    /// engine currently assigns it. A missing container reports as stopped.
    async fn inspect(&self, name: &str) -> Result<WorkloadState>;

    /// Execute a command inside the workload, capturing output and exit code.
    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    /// Pick whichever engine binary is on PATH, docker first.
    pub fn detect() -> Result<Self> {
        if which::which("docker").is_ok() {
            Ok(RuntimeKind::Docker)
        } else if which::which("podman").is_ok() {
            Ok(RuntimeKind::Podman)
        } else {
            Err(NetlockError::Engine(
                "neither docker nor podman found on PATH - install one or pass --runtime".to_string(),
            ))
        }
    }
}

/// Create a runtime client for the given engine.
pub fn create_runtime(kind: RuntimeKind) -> Box<dyn ContainerRuntime> {
    match kind {
        RuntimeKind::Docker => Box::new(docker::DockerRuntime::new()),
        RuntimeKind::Podman => Box::new(podman::PodmanRuntime::new()),
    }
}

/// Helper to run an engine command and capture output. Callers inspect the
/// exit status themselves; only failure to spawn is an error here.
async fn run_command(cmd: &mut Command) -> Result<std::process::Output> {
    debug!("Running command: {:?}", cmd);

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| NetlockError::Engine(format!("failed to execute command: {}", e)))
}

/// Map a failed engine invocation to the right error variant.
fn engine_failure(status: std::process::ExitStatus, stderr: &str) -> NetlockError {
    if stderr.contains("permission denied") || stderr.contains("Permission denied") {
        NetlockError::InsufficientPrivilege("talk to the container engine".to_string())
    } else {
        NetlockError::Engine(format!(
            "command failed with status {}: {}",
            status,
            stderr.trim()
        ))
    }
}

/// Subset of `inspect` JSON shared by docker and podman.
#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: Option<InspectNetworkSettings>,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running")]
    running: bool,
}

#[derive(Debug, Deserialize)]
struct InspectNetworkSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "Networks", default)]
    networks: HashMap<String, InspectNetwork>,
}

#[derive(Debug, Deserialize)]
struct InspectNetwork {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

/// Parse `inspect` output into a [`WorkloadState`]. The top-level IPAddress
/// is empty for containers on user-defined networks; fall back to the first
/// attached network endpoint that has one.
fn parse_inspect(json: &str) -> Result<WorkloadState> {
    let entries: Vec<InspectEntry> = serde_json::from_str(json)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| NetlockError::Engine("inspect returned no entries".to_string()))?;

    let address = entry.network_settings.as_ref().and_then(|ns| {
        if !ns.ip_address.is_empty() {
            ns.ip_address.parse().ok()
        } else {
            ns.networks
                .values()
                .find(|n| !n.ip_address.is_empty())
                .and_then(|n| n.ip_address.parse().ok())
        }
    });

    Ok(WorkloadState {
        running: entry.state.running,
        address,
    })
}

/// True when the engine's stderr says the container does not exist at all;
/// treated as not-running rather than as an engine fault.
fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such object")
        || stderr.contains("No such container")
        || stderr.contains("no such container")
}
