//! Firewall rule model and best-effort rule operations
//!
//! A [`Rule`] is a pure value: table, chain and match arguments, fully
//! determined by the interface/DNS triple it is built from. [`Firewall`]
//! turns rules into `iptables`/`ip6tables` invocations with
//! check-then-add semantics on install and swallowed failures on removal,
//! so both directions are safe to repeat.

use std::fmt;
use std::fs;

use crate::cmd::CommandRunner;
use crate::{IPV4_FORWARD_PROC, IPV6_FORWARD_PROC};

/// IP protocol family a rule is installed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// The firewall command for this family
    pub fn command(self) -> &'static str {
        match self {
            Family::V4 => "iptables",
            Family::V6 => "ip6tables",
        }
    }
}

/// A single firewall rule, addressed by table, chain and match arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    family: Family,
    table: Option<&'static str>,
    chain: &'static str,
    args: Vec<String>,
}

impl Rule {
    fn filter(chain: &'static str, args: Vec<String>) -> Self {
        Self {
            family: Family::V4,
            table: None,
            chain,
            args,
        }
    }

    fn nat(chain: &'static str, args: Vec<String>) -> Self {
        Self {
            family: Family::V4,
            table: Some("nat"),
            chain,
            args,
        }
    }

    /// Forward packets arriving on the tether interface out the vpn interface.
    pub fn forward_accept(tether: &str, vpn: &str) -> Self {
        Self::filter(
            "FORWARD",
            vec![
                "-i".into(),
                tether.into(),
                "-o".into(),
                vpn.into(),
                "-j".into(),
                "ACCEPT".into(),
            ],
        )
    }

    /// Forward return traffic for established flows back to the tether.
    pub fn forward_established(tether: &str, vpn: &str) -> Self {
        Self::filter(
            "FORWARD",
            vec![
                "-i".into(),
                vpn.into(),
                "-o".into(),
                tether.into(),
                "-m".into(),
                "state".into(),
                "--state".into(),
                "RELATED,ESTABLISHED".into(),
                "-j".into(),
                "ACCEPT".into(),
            ],
        )
    }

    /// Masquerade everything leaving through the vpn interface.
    pub fn masquerade(vpn: &str) -> Self {
        Self::nat(
            "POSTROUTING",
            vec!["-o".into(), vpn.into(), "-j".into(), "MASQUERADE".into()],
        )
    }

    /// Redirect tethered clients' DNS queries to the given resolver.
    pub fn dns_redirect(proto: &str, tether: &str, dns: &str) -> Self {
        Self::nat(
            "PREROUTING",
            vec![
                "-i".into(),
                tether.into(),
                "-p".into(),
                proto.into(),
                "--dport".into(),
                "53".into(),
                "-j".into(),
                "DNAT".into(),
                "--to-destination".into(),
                dns.into(),
            ],
        )
    }

    /// Accept traffic from the tether interface addressed to this host.
    pub fn input_accept(tether: &str) -> Self {
        Self::filter(
            "INPUT",
            vec!["-i".into(), tether.into(), "-j".into(), "ACCEPT".into()],
        )
    }

    /// Mirror this rule into the IPv6 tables.
    pub fn ipv6(mut self) -> Self {
        self.family = Family::V6;
        self
    }

    /// The family this rule belongs to
    pub fn family(&self) -> Family {
        self.family
    }

    /// Full argument vector for the given operation flag (`-C`, `-A`, `-D`).
    pub fn argv(&self, op: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 4);
        if let Some(table) = self.table {
            argv.push("-t".to_string());
            argv.push(table.to_string());
        }
        argv.push(op.to_string());
        argv.push(self.chain.to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family.command(), self.argv("-A").join(" "))
    }
}

/// Best-effort firewall mutation layer.
///
/// Every operation logs and swallows command failures; callers sequence
/// operations without ever aborting on an individual rule.
pub struct Firewall<'r> {
    runner: &'r dyn CommandRunner,
}

impl<'r> Firewall<'r> {
    /// Create a firewall layer on top of the given runner
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn run_op(&self, rule: &Rule, op: &str) -> Option<bool> {
        let argv = rule.argv(op);
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        match self.runner.run(rule.family().command(), &args) {
            Ok(out) => Some(out.success),
            Err(e) => {
                log::warn!("{} {}: {}", rule.family().command(), op, e);
                None
            }
        }
    }

    /// Check whether an identical rule is already installed.
    pub fn exists(&self, rule: &Rule) -> bool {
        self.run_op(rule, "-C").unwrap_or(false)
    }

    /// Install a rule unless an identical one is already present.
    ///
    /// Returns true when the rule was newly added.
    pub fn ensure(&self, rule: &Rule) -> bool {
        if self.exists(rule) {
            log::debug!("rule already present: {}", rule);
            return false;
        }
        match self.run_op(rule, "-A") {
            Some(true) => {
                log::debug!("rule added: {}", rule);
                true
            }
            _ => {
                log::warn!("failed to add rule: {}", rule);
                false
            }
        }
    }

    /// Remove a rule. Absence is a harmless, expected outcome.
    ///
    /// Returns true when a rule was actually removed.
    pub fn remove(&self, rule: &Rule) -> bool {
        match self.run_op(rule, "-D") {
            Some(true) => {
                log::debug!("rule removed: {}", rule);
                true
            }
            _ => {
                log::debug!("rule was not installed: {}", rule);
                false
            }
        }
    }

    /// Enable global IPv4 forwarding.
    pub fn enable_ipv4_forwarding(&self) {
        if let Err(e) = fs::write(IPV4_FORWARD_PROC, "1") {
            log::warn!("failed to enable IPv4 forwarding: {}", e);
        }
    }

    /// Enable global IPv6 forwarding.
    pub fn enable_ipv6_forwarding(&self) {
        if let Err(e) = fs::write(IPV6_FORWARD_PROC, "1") {
            log::warn!("failed to enable IPv6 forwarding: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    #[test]
    fn forward_accept_argv() {
        let rule = Rule::forward_accept("wlan0", "tun0");
        assert_eq!(
            rule.argv("-A"),
            ["-A", "FORWARD", "-i", "wlan0", "-o", "tun0", "-j", "ACCEPT"]
        );
    }

    #[test]
    fn masquerade_targets_nat_table() {
        let rule = Rule::masquerade("tun0");
        assert_eq!(
            rule.argv("-C"),
            ["-t", "nat", "-C", "POSTROUTING", "-o", "tun0", "-j", "MASQUERADE"]
        );
    }

    #[test]
    fn dns_redirect_argv() {
        let rule = Rule::dns_redirect("udp", "wlan0", "8.8.8.8");
        let argv = rule.argv("-A");
        assert!(argv.contains(&"DNAT".to_string()));
        assert!(argv.contains(&"--to-destination".to_string()));
        assert!(argv.contains(&"8.8.8.8".to_string()));
        assert_eq!(argv[0], "-t");
        assert_eq!(argv[1], "nat");
    }

    #[test]
    fn ipv6_mirror_switches_command() {
        let rule = Rule::forward_accept("wlan0", "tun0").ipv6();
        assert_eq!(rule.family().command(), "ip6tables");
    }

    #[test]
    fn ensure_is_idempotent() {
        let runner = MockRunner::new();
        let fw = Firewall::new(&runner);
        let rule = Rule::forward_accept("wlan0", "tun0");

        assert!(fw.ensure(&rule));
        assert!(!fw.ensure(&rule));
        assert_eq!(runner.installed_rules().len(), 1);
    }

    #[test]
    fn remove_tolerates_absent_rule() {
        let runner = MockRunner::new();
        let fw = Firewall::new(&runner);
        let rule = Rule::masquerade("tun0");

        assert!(!fw.remove(&rule));

        fw.ensure(&rule);
        assert!(fw.remove(&rule));
        assert!(runner.installed_rules().is_empty());
    }

    #[test]
    fn display_reads_like_a_command_line() {
        let rule = Rule::masquerade("wg0");
        assert_eq!(
            rule.to_string(),
            "iptables -t nat -A POSTROUTING -o wg0 -j MASQUERADE"
        );
    }
}
