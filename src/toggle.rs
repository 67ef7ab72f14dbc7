use crate::config::ToggleConfig;
use crate::error::{NetlockError, Result};
use crate::firewall::{Rule, RuleEntry, RuleStore};
use crate::probe::{self, ProbeOutcome};
use crate::runtime::ContainerRuntime;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of `enable`.
#[derive(Debug, Serialize)]
pub struct EnableReport {
    /// Address the fresh pair was scoped to
    pub address: Ipv4Addr,
    /// Stale marker-tagged rules purged before installing the pair
    pub purged: usize,
    /// Verification result, when the probe ran
    pub probe: Option<ProbeOutcome>,
}

/// Outcome of `disable`.
#[derive(Debug, Serialize)]
pub struct DisableReport {
    /// Rule specs that were removed, verbatim
    pub removed: Vec<String>,
}

impl DisableReport {
    pub fn was_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Firewall half of the status report. Reading rule state needs elevated
/// privilege; when that is unavailable the state is reported as unknown
/// rather than guessed.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FirewallStatus {
    Active { rules: Vec<String> },
    Inactive,
    Unknown { reason: String },
}

/// Outcome of `status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub container: String,
    pub running: bool,
    pub address: Option<Ipv4Addr>,
    pub firewall: FirewallStatus,
}

/// The isolation state machine: INACTIVE -> ACTIVE via [`enable`], back via
/// [`disable`]. Enabling while already active replaces the pair, because the
/// workload's address may have changed since it was installed.
///
/// [`enable`]: IsolationToggle::enable
/// [`disable`]: IsolationToggle::disable
pub struct IsolationToggle {
    config: ToggleConfig,
    runtime: Arc<dyn ContainerRuntime>,
    chain: Arc<dyn RuleStore>,
}

impl IsolationToggle {
    pub fn new(
        config: ToggleConfig,
        runtime: Arc<dyn ContainerRuntime>,
        chain: Arc<dyn RuleStore>,
    ) -> Self {
        Self {
            config,
            runtime,
            chain,
        }
    }

    pub fn config(&self) -> &ToggleConfig {
        &self.config
    }

    /// Install the isolation pair for the workload's current address,
    /// purging any stale marker-tagged rules first.
    pub async fn enable(&self) -> Result<EnableReport> {
        let address = self.resolve_address().await?;
        info!(
            "Enabling isolation for '{}' at {}",
            self.config.container, address
        );

        let purged = self.purge_tagged().await?;
        if purged > 0 {
            debug!("Purged {} stale rule(s) carrying '{}'", purged, self.config.marker);
        }

        // Ordering matters: the established/related exception must be
        // evaluated before the blanket deny.
        self.chain
            .insert(1, &Rule::allow_return(address, &self.config.marker))
            .await?;
        self.chain
            .insert(2, &Rule::deny(address, &self.config.marker))
            .await?;

        let probe = if self.config.no_probe {
            None
        } else {
            let outcome = probe::verify_blocked(self.runtime.as_ref(), &self.config).await;
            match outcome {
                ProbeOutcome::Blocked => info!("Probe confirms outbound access is blocked"),
                ProbeOutcome::Reached => warn!(
                    "Probe reached {} from inside the workload - isolation is NOT effective",
                    self.config.probe_url
                ),
                ProbeOutcome::Inconclusive => {
                    warn!("Probe was inconclusive; rules remain installed")
                }
            }
            Some(outcome)
        };

        Ok(EnableReport {
            address,
            purged,
            probe,
        })
    }

    /// Remove every rule carrying the marker, across all addresses. Safe to
    /// call when nothing is installed.
    pub async fn disable(&self) -> Result<DisableReport> {
        let tagged = self.tagged_entries().await?;
        if tagged.is_empty() {
            info!("No rules carry '{}'; nothing to remove", self.config.marker);
            return Ok(DisableReport { removed: vec![] });
        }

        let removed = self.delete_entries(&tagged).await;
        info!(
            "Removed {} of {} rule(s) carrying '{}'",
            removed.len(),
            tagged.len(),
            self.config.marker
        );
        Ok(DisableReport { removed })
    }

    /// Read-only report of workload state and rule presence. Never mutates;
    /// degrades to `FirewallStatus::Unknown` when rule state is unreadable.
    pub async fn status(&self) -> Result<StatusReport> {
        let state = self.runtime.inspect(&self.config.container).await?;

        let firewall = match self.tagged_entries().await {
            Ok(tagged) if tagged.is_empty() => FirewallStatus::Inactive,
            Ok(tagged) => FirewallStatus::Active {
                rules: tagged.into_iter().map(|e| e.spec).collect(),
            },
            // Best-effort: a failed read (typically missing privilege) must
            // not turn status into a guess or an abort
            Err(e) => FirewallStatus::Unknown {
                reason: e.to_string(),
            },
        };

        Ok(StatusReport {
            container: self.config.container.clone(),
            running: state.running,
            address: state.address,
            firewall,
        })
    }

    async fn resolve_address(&self) -> Result<Ipv4Addr> {
        let state = self.runtime.inspect(&self.config.container).await?;
        if !state.running {
            return Err(NetlockError::WorkloadNotRunning(
                self.config.container.clone(),
            ));
        }
        state
            .address
            .ok_or_else(|| NetlockError::WorkloadNotRunning(self.config.container.clone()))
    }

    /// Rules in the chain carrying our marker, in evaluation order.
    /// Identification is by tag alone so that pairs bound to a previous
    /// address are still found.
    async fn tagged_entries(&self) -> Result<Vec<RuleEntry>> {
        let entries = self.chain.list().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.has_marker(&self.config.marker))
            .collect())
    }

    /// Remove all marker-tagged rules, returning how many went away.
    async fn purge_tagged(&self) -> Result<usize> {
        let tagged = self.tagged_entries().await?;
        if tagged.len() % 2 != 0 {
            warn!(
                "Found {} rule(s) carrying '{}' (expected a pair) - cleaning up partial state",
                tagged.len(),
                self.config.marker
            );
        }
        Ok(self.delete_entries(&tagged).await.len())
    }

    /// Best-effort deletion: one missing or undeletable rule must not block
    /// removing the others.
    async fn delete_entries(&self, entries: &[RuleEntry]) -> Vec<String> {
        let mut removed = Vec::new();
        for entry in entries {
            match self.chain.delete(entry).await {
                Ok(()) => removed.push(entry.spec.clone()),
                Err(e) => warn!("Could not remove rule '{}': {}", entry.spec, e),
            }
        }
        removed
    }
}
