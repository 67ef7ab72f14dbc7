use super::{
    engine_failure, is_missing_container, parse_inspect, run_command, ContainerRuntime,
    ExecOutput, WorkloadState,
};
use crate::error::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub struct PodmanRuntime;

impl PodmanRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn inspect(&self, name: &str) -> Result<WorkloadState> {
        let mut cmd = Command::new("podman");
        // `container inspect` to avoid matching an image with the same name
        cmd.arg("container").arg("inspect").arg(name);

        let output = run_command(&mut cmd).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                debug!("Container {} does not exist", name);
                return Ok(WorkloadState::stopped());
            }
            return Err(engine_failure(output.status, &stderr));
        }

        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        debug!("Executing command in container {}: {:?}", name, command);

        let mut cmd = Command::new("podman");
        cmd.arg("exec").arg(name);
        for arg in command {
            cmd.arg(arg);
        }

        let output = run_command(&mut cmd).await?;
        Ok(ExecOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
