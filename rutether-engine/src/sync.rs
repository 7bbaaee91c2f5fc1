//! Rule synchronization
//!
//! Translates one observed topology into the firewall operations that
//! install or remove its rules. Both directions derive their rule list
//! from the same function, so apply and flush are symmetric by
//! construction, and both are safe to repeat: install checks before
//! adding, removal tolerates absent rules.

use std::sync::Arc;

use tether_net::cmd::CommandRunner;
use tether_net::link;
use tether_net::rules::{Firewall, Rule};

use crate::detect::Topology;

/// Issues the idempotent command sequences converging the firewall to a
/// topology's rule set.
///
/// The synchronizer holds no applied-state of its own; it acts purely on
/// the topology passed to each call. Sequencing decisions belong to the
/// reconciler.
pub struct RuleSync {
    runner: Arc<dyn CommandRunner>,
    clat_interface: String,
    ipv6_mirror: bool,
}

impl RuleSync {
    /// Create a synchronizer over the given runner
    pub fn new(runner: Arc<dyn CommandRunner>, clat_interface: String, ipv6_mirror: bool) -> Self {
        Self {
            runner,
            clat_interface,
            ipv6_mirror,
        }
    }

    /// The rules implied by a topology.
    ///
    /// Fields that are absent contribute nothing, so a partially-empty
    /// topology yields exactly the subset of rules its fields justify.
    fn rules_for(&self, topology: &Topology, mirror: bool) -> Vec<Rule> {
        let mut rules = Vec::new();

        if let (Some(tether), Some(vpn)) = (&topology.tether, &topology.vpn) {
            rules.push(Rule::forward_accept(tether, vpn));
            rules.push(Rule::forward_established(tether, vpn));
            if mirror {
                rules.push(Rule::forward_accept(tether, vpn).ipv6());
            }
        }

        if let Some(vpn) = &topology.vpn {
            rules.push(Rule::masquerade(vpn));
        }

        if let Some(tether) = &topology.tether {
            if let Some(dns) = &topology.dns {
                rules.push(Rule::dns_redirect("udp", tether, dns));
                rules.push(Rule::dns_redirect("tcp", tether, dns));
            }
            rules.push(Rule::input_accept(tether));
        }

        rules
    }

    /// Whether the IPv6 mirror applies right now.
    fn mirror_active(&self) -> bool {
        if !self.ipv6_mirror {
            return false;
        }
        match link::list_links(self.runner.as_ref()) {
            Ok(links) => links.iter().any(|l| l.name == self.clat_interface),
            Err(e) => {
                log::debug!("clat probe failed: {}", e);
                false
            }
        }
    }

    /// Converge the firewall towards this topology's full rule set.
    ///
    /// Enables IPv4 forwarding, then check-then-adds every rule; calling
    /// this repeatedly with the same topology accumulates nothing.
    pub fn apply(&self, topology: &Topology) {
        if !topology.is_routable() {
            return;
        }

        let fw = Firewall::new(self.runner.as_ref());
        fw.enable_ipv4_forwarding();

        let mirror = self.mirror_active();
        if mirror {
            fw.enable_ipv6_forwarding();
        }

        let rules = self.rules_for(topology, mirror);
        let total = rules.len();
        let added = rules.iter().filter(|r| fw.ensure(r)).count();
        log::info!("{}: {} rules ensured, {} newly added", topology, total, added);
    }

    /// Remove exactly the rules [`RuleSync::apply`] would have installed
    /// for this topology.
    ///
    /// Returns immediately when the topology has neither interface.
    /// Removal failures are swallowed; "already absent" is a normal
    /// outcome.
    pub fn flush(&self, topology: &Topology) {
        if topology.tether.is_none() && topology.vpn.is_none() {
            return;
        }

        let fw = Firewall::new(self.runner.as_ref());
        let rules = self.rules_for(topology, self.mirror_active());
        let removed = rules.iter().rev().filter(|r| fw.remove(r)).count();
        log::info!("{}: {} rules removed", topology, removed);
    }
}
