use crate::config::ToggleConfig;
use crate::runtime::ContainerRuntime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Result of the post-enable connectivity check, run from inside the
/// workload. After isolation is enabled, `Blocked` is the desired outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The outbound request failed at the network layer.
    Blocked,
    /// The outbound request succeeded; isolation is not effective.
    Reached,
    /// The probe could not run or gave an ambiguous result (workload still
    /// initializing, curl missing, engine unresponsive).
    Inconclusive,
}

/// curl exit codes that mean the network path is cut rather than that curl
/// itself failed to run: resolve failure, connect failure, timeout, TLS
/// handshake aborts.
const CURL_BLOCKED_CODES: &[i32] = &[6, 7, 28, 35, 56];

/// Try an outbound request from inside the workload and classify the result.
///
/// This is an observability aid only. Callers treat anything but `Blocked`
/// as a warning, never as grounds to roll the rules back.
pub async fn verify_blocked(
    runtime: &dyn ContainerRuntime,
    config: &ToggleConfig,
) -> ProbeOutcome {
    let argv = vec![
        "curl".to_string(),
        "--silent".to_string(),
        "--show-error".to_string(),
        "--max-time".to_string(),
        config.probe_timeout().as_secs().to_string(),
        config.probe_url.clone(),
    ];

    let exec = runtime.exec(&config.container, &argv);
    let output = match tokio::time::timeout(config.probe_deadline(), exec).await {
        Err(_) => {
            warn!(
                "Probe did not finish within {:?}; treating as inconclusive",
                config.probe_deadline()
            );
            return ProbeOutcome::Inconclusive;
        }
        Ok(Err(e)) => {
            warn!("Probe could not run: {}", e);
            return ProbeOutcome::Inconclusive;
        }
        Ok(Ok(output)) => output,
    };

    debug!(
        "Probe exit code {:?}, stdout: {}, stderr: {}",
        output.code,
        output.stdout.trim(),
        output.stderr.trim()
    );

    match output.code {
        Some(0) => ProbeOutcome::Reached,
        Some(code) if CURL_BLOCKED_CODES.contains(&code) => ProbeOutcome::Blocked,
        _ => ProbeOutcome::Inconclusive,
    }
}
