use super::{Rule, RuleEntry, RuleStore};
use crate::error::{NetlockError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// [`RuleStore`] backed by the `iptables` binary, operating on one chain of
/// the filter table.
pub struct IptablesChain {
    chain: String,
}

impl IptablesChain {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new("iptables");
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!("Running command: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| NetlockError::Firewall(format!("failed to run iptables: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_privilege_error(&stderr) {
                return Err(NetlockError::InsufficientPrivilege(
                    "access firewall rules".to_string(),
                ));
            }
            return Err(NetlockError::Firewall(format!(
                "iptables exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RuleStore for IptablesChain {
    async fn list(&self) -> Result<Vec<RuleEntry>> {
        let output = self.run(&["-S".to_string(), self.chain.clone()]).await?;
        let prefix = format!("-A {} ", self.chain);

        // -S also prints the chain declaration (-N/-P line); only -A lines
        // are rules.
        let entries = output
            .lines()
            .filter_map(|line| line.strip_prefix(&prefix))
            .map(RuleEntry::new)
            .collect();
        Ok(entries)
    }

    async fn insert(&self, position: usize, rule: &Rule) -> Result<()> {
        let mut args = vec![
            "-I".to_string(),
            self.chain.clone(),
            position.to_string(),
        ];
        args.extend(rule.to_args());
        self.run(&args).await?;
        Ok(())
    }

    async fn delete(&self, entry: &RuleEntry) -> Result<()> {
        let mut args = vec!["-D".to_string(), self.chain.clone()];
        args.extend(entry.tokens());
        self.run(&args).await?;
        Ok(())
    }
}

fn is_privilege_error(stderr: &str) -> bool {
    stderr.contains("Permission denied")
        || stderr.contains("Operation not permitted")
        || stderr.contains("you must be root")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_error_detection() {
        assert!(is_privilege_error(
            "iptables v1.8.9: can't initialize iptables table `filter': Permission denied"
        ));
        assert!(is_privilege_error(
            "Fatal: can't open lock file: Operation not permitted"
        ));
        assert!(!is_privilege_error("iptables: No chain/target/match by that name."));
    }

    #[test]
    fn test_list_strips_chain_prefix() {
        // Mirrors the filtering done in list() on real -S output
        let output = "-N DOCKER-USER\n-A DOCKER-USER -s 172.17.0.5/32 -j DROP\n-A DOCKER-USER -j RETURN\n";
        let prefix = "-A DOCKER-USER ";
        let entries: Vec<RuleEntry> = output
            .lines()
            .filter_map(|line| line.strip_prefix(prefix))
            .map(RuleEntry::new)
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].spec, "-s 172.17.0.5/32 -j DROP");
        assert_eq!(entries[1].spec, "-j RETURN");
    }
}
