use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default container name of the isolated web UI workload.
pub const DEFAULT_CONTAINER: &str = "webui";

/// Default marker attached to every rule this tool installs, so the pair can
/// be enumerated and removed as a set without touching foreign rules.
pub const DEFAULT_MARKER: &str = "netlock";

/// Default forwarding chain the rule pair is inserted into. `DOCKER-USER` is
/// evaluated before the engine's own forwarding rules for both docker and
/// podman-with-netavark setups.
pub const DEFAULT_CHAIN: &str = "DOCKER-USER";

/// Default endpoint for the post-enable connectivity probe. Failing to reach
/// it from inside the workload is the desired outcome.
pub const DEFAULT_PROBE_URL: &str = "https://example.com";

/// Per-attempt probe timeout, in seconds, passed to curl's --max-time.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    /// Name of the workload container
    pub container: String,

    /// Marker string tagged onto both rules of the isolation pair
    pub marker: String,

    /// Firewall chain holding the isolation pair
    pub chain: String,

    /// Endpoint the verification probe tries to reach from inside the workload
    pub probe_url: String,

    /// Skip the post-enable verification probe
    #[serde(default)]
    pub no_probe: bool,
}

impl ToggleConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS)
    }

    /// Outer bound on the whole probe exec, so enable never hangs on an
    /// unresponsive engine even if curl's own timeout is not honored.
    pub fn probe_deadline(&self) -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS + 3)
    }
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            marker: DEFAULT_MARKER.to_string(),
            chain: DEFAULT_CHAIN.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            no_probe: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToggleConfig::default();
        assert_eq!(config.container, "webui");
        assert_eq!(config.marker, "netlock");
        assert_eq!(config.chain, "DOCKER-USER");
        assert!(!config.no_probe);
    }

    #[test]
    fn test_probe_deadline_exceeds_timeout() {
        let config = ToggleConfig::default();
        assert!(config.probe_deadline() > config.probe_timeout());
    }
}
