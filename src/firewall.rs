use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub mod iptables;

/// What a rule does with traffic from the workload address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Accept only established/related traffic (responses to connections the
    /// operator's browser initiated).
    AllowReturn,
    /// Drop everything else from the address (new outbound connections).
    Deny,
}

/// One rule of the isolation pair, scoped to a workload address and tagged
/// with the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: Ipv4Addr,
    pub verdict: Verdict,
    pub marker: String,
}

impl Rule {
    pub fn allow_return(source: Ipv4Addr, marker: impl Into<String>) -> Self {
        Self {
            source,
            verdict: Verdict::AllowReturn,
            marker: marker.into(),
        }
    }

    pub fn deny(source: Ipv4Addr, marker: impl Into<String>) -> Self {
        Self {
            source,
            verdict: Verdict::Deny,
            marker: marker.into(),
        }
    }

    /// Render the match criteria as iptables arguments, without the
    /// `-A/-I <chain>` prefix.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string(), format!("{}/32", self.source)];
        if self.verdict == Verdict::AllowReturn {
            args.push("-m".to_string());
            args.push("state".to_string());
            args.push("--state".to_string());
            args.push("ESTABLISHED,RELATED".to_string());
        }
        args.push("-m".to_string());
        args.push("comment".to_string());
        args.push("--comment".to_string());
        args.push(self.marker.clone());
        args.push("-j".to_string());
        args.push(match self.verdict {
            Verdict::AllowReturn => "ACCEPT".to_string(),
            Verdict::Deny => "DROP".to_string(),
        });
        args
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

/// A rule as listed from the chain: the verbatim rule-spec (everything after
/// `-A <chain>` in `iptables -S` output) plus lazy accessors over it.
///
/// Listing keeps the raw text so `status` can show the operator exactly what
/// is installed, and so deletion can replay the spec token-for-token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub spec: String,
}

impl RuleEntry {
    pub fn new(spec: impl Into<String>) -> Self {
        Self { spec: spec.into() }
    }

    /// Split the spec into argv tokens, honoring the double quotes iptables
    /// puts around comment values in `-S` output.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        for c in self.spec.chars() {
            match c {
                '"' => in_quotes = !in_quotes,
                ' ' if !in_quotes => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    /// Value following a flag token, if present.
    fn value_after(&self, flag: &str) -> Option<String> {
        let tokens = self.tokens();
        tokens
            .iter()
            .position(|t| t == flag)
            .and_then(|i| tokens.get(i + 1))
            .cloned()
    }

    /// The comment tag carried by this rule, if any.
    pub fn marker(&self) -> Option<String> {
        self.value_after("--comment")
    }

    /// Source address the rule is scoped to, with any /32 suffix stripped.
    pub fn source(&self) -> Option<Ipv4Addr> {
        let value = self.value_after("-s")?;
        let addr = value.strip_suffix("/32").unwrap_or(&value);
        addr.parse().ok()
    }

    /// Classify the rule as one half of an isolation pair, when it looks
    /// like one.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.value_after("-j")?.as_str() {
            "ACCEPT" => {
                let states = self
                    .value_after("--state")
                    .or_else(|| self.value_after("--ctstate"))?;
                if states == "ESTABLISHED,RELATED" {
                    Some(Verdict::AllowReturn)
                } else {
                    None
                }
            }
            "DROP" => Some(Verdict::Deny),
            _ => None,
        }
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.marker().as_deref() == Some(marker)
    }
}

impl From<&Rule> for RuleEntry {
    fn from(rule: &Rule) -> Self {
        Self::new(rule.to_args().join(" "))
    }
}

/// Repository interface over the firewall chain. The toggle logic only talks
/// to this trait; tests substitute [`MemoryChain`] for the real packet filter.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List every rule currently in the chain, in evaluation order.
    async fn list(&self) -> Result<Vec<RuleEntry>>;

    /// Insert a rule at the given 1-based chain position.
    async fn insert(&self, position: usize, rule: &Rule) -> Result<()>;

    /// Delete one listed rule by replaying its exact spec.
    async fn delete(&self, entry: &RuleEntry) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_return_args() {
        let rule = Rule::allow_return("172.17.0.5".parse().unwrap(), "netlock");
        let args = rule.to_args();
        assert_eq!(
            args,
            vec![
                "-s",
                "172.17.0.5/32",
                "-m",
                "state",
                "--state",
                "ESTABLISHED,RELATED",
                "-m",
                "comment",
                "--comment",
                "netlock",
                "-j",
                "ACCEPT"
            ]
        );
    }

    #[test]
    fn test_deny_args() {
        let rule = Rule::deny("172.17.0.5".parse().unwrap(), "netlock");
        let args = rule.to_args();
        assert!(!args.contains(&"--state".to_string()));
        assert_eq!(args.last().unwrap(), "DROP");
    }

    #[test]
    fn test_entry_accessors_unquoted_comment() {
        let entry = RuleEntry::new(
            "-s 172.17.0.5/32 -m comment --comment netlock -j DROP",
        );
        assert_eq!(entry.marker().as_deref(), Some("netlock"));
        assert_eq!(entry.source(), Some("172.17.0.5".parse().unwrap()));
        assert_eq!(entry.verdict(), Some(Verdict::Deny));
        assert!(entry.has_marker("netlock"));
        assert!(!entry.has_marker("other"));
    }

    #[test]
    fn test_entry_accessors_quoted_comment() {
        // iptables -S quotes comment values
        let entry = RuleEntry::new(
            "-s 172.17.0.5/32 -m state --state ESTABLISHED,RELATED -m comment --comment \"netlock\" -j ACCEPT",
        );
        assert_eq!(entry.marker().as_deref(), Some("netlock"));
        assert_eq!(entry.verdict(), Some(Verdict::AllowReturn));
    }

    #[test]
    fn test_entry_conntrack_ctstate() {
        let entry = RuleEntry::new(
            "-s 10.88.0.7/32 -m conntrack --ctstate ESTABLISHED,RELATED -m comment --comment \"netlock\" -j ACCEPT",
        );
        assert_eq!(entry.verdict(), Some(Verdict::AllowReturn));
        assert_eq!(entry.source(), Some("10.88.0.7".parse().unwrap()));
    }

    #[test]
    fn test_entry_foreign_rule() {
        let entry = RuleEntry::new("-i docker0 -o docker0 -j ACCEPT");
        assert_eq!(entry.marker(), None);
        assert_eq!(entry.source(), None);
        assert_eq!(entry.verdict(), None);
    }

    #[test]
    fn test_tokens_quoted_comment_with_space() {
        let entry = RuleEntry::new("-m comment --comment \"net lock\" -j DROP");
        let tokens = entry.tokens();
        assert!(tokens.contains(&"net lock".to_string()));
        assert_eq!(entry.marker().as_deref(), Some("net lock"));
    }

    #[test]
    fn test_round_trip_through_entry() {
        let rule = Rule::allow_return("192.168.50.9".parse().unwrap(), "netlock");
        let entry = RuleEntry::from(&rule);
        assert_eq!(entry.marker().as_deref(), Some("netlock"));
        assert_eq!(entry.source(), Some(rule.source));
        assert_eq!(entry.verdict(), Some(Verdict::AllowReturn));
    }
}
