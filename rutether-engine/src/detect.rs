//! Topology detection
//!
//! Determines the current best-guess tether interface, VPN interface and
//! DNS server from live OS state. Detection is stateless and never
//! fails: every underlying error counts as a miss, is logged at debug
//! level, and the next fallback in the chain is tried.

use std::fmt;
use std::fs;
use std::sync::Arc;

use ipnet::Ipv4Net;
use tether_net::cmd::CommandRunner;
use tether_net::link;

use crate::config::DetectConfig;

/// One observed (tether, vpn, dns) triple.
///
/// `None` means the corresponding piece was not found. Two topologies
/// are equal iff all three fields match by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// Interface the device shares connectivity on
    pub tether: Option<String>,
    /// Interface of the active VPN tunnel
    pub vpn: Option<String>,
    /// Resolver tethered clients' DNS queries are redirected to
    pub dns: Option<String>,
}

impl Topology {
    /// Whether both interfaces needed for forwarding are present
    pub fn is_routable(&self) -> bool {
        self.tether.is_some() && self.vpn.is_some()
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tether={} vpn={} dns={}",
            self.tether.as_deref().unwrap_or("-"),
            self.vpn.as_deref().unwrap_or("-"),
            self.dns.as_deref().unwrap_or("-"),
        )
    }
}

/// Detects the current network topology.
///
/// Each detector runs an ordered chain of matchers: the configured
/// priority list first, then a textual fallback over everything the OS
/// reports. Detection has no memory; every call re-derives from live
/// state.
pub struct TopologyDetector {
    cfg: DetectConfig,
    networks: Vec<Ipv4Net>,
    runner: Arc<dyn CommandRunner>,
}

impl TopologyDetector {
    /// Create a detector over the given runner
    pub fn new(cfg: DetectConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let networks = cfg.networks();
        Self {
            cfg,
            networks,
            runner,
        }
    }

    /// Take a full topology snapshot
    pub fn detect(&self) -> Topology {
        let topology = Topology {
            tether: self.detect_tether(),
            vpn: self.detect_vpn(),
            dns: self.detect_dns(),
        };
        log::debug!("detected {}", topology);
        topology
    }

    /// Find the active VPN interface.
    ///
    /// Priority list first; when none of the well-known names exists,
    /// scan all links for tunnel-like attributes or a name keyword.
    pub fn detect_vpn(&self) -> Option<String> {
        for name in &self.cfg.vpn_interfaces {
            if link::interface_exists(name) {
                return Some(name.clone());
            }
        }

        let links = match link::list_links(self.runner.as_ref()) {
            Ok(links) => links,
            Err(e) => {
                log::debug!("vpn link scan failed: {}", e);
                return None;
            }
        };

        links
            .into_iter()
            .filter(|l| l.name != "lo")
            .find(|l| {
                l.is_tunnel_like()
                    || self.cfg.vpn_keywords.iter().any(|k| l.name.contains(k.as_str()))
            })
            .map(|l| l.name)
    }

    /// Find the tether interface.
    ///
    /// A priority-list candidate counts only while it carries an IPv4
    /// address inside one of the configured private networks; the
    /// fallback accepts the first addressed interface with a
    /// tether-style name.
    pub fn detect_tether(&self) -> Option<String> {
        let addrs = match link::list_ipv4_addrs(self.runner.as_ref()) {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("tether address scan failed: {}", e);
                return None;
            }
        };

        for name in &self.cfg.tether_interfaces {
            let private = addrs.iter().any(|a| {
                a.interface == *name && self.networks.iter().any(|n| n.contains(&a.address))
            });
            if private {
                return Some(name.clone());
            }
        }

        addrs
            .into_iter()
            .filter(|a| a.interface != "lo")
            .find(|a| {
                self.cfg
                    .tether_keywords
                    .iter()
                    .any(|k| a.interface.contains(k.as_str()))
            })
            .map(|a| a.interface)
    }

    /// Find the upstream DNS server.
    ///
    /// Probes the configured system properties in order, accepting the
    /// first value containing a digit, then falls back to the first
    /// `nameserver` line of the resolver file.
    pub fn detect_dns(&self) -> Option<String> {
        for prop in &self.cfg.dns_properties {
            match self.runner.run("getprop", &[prop]) {
                Ok(out) if out.success => {
                    let value = out.stdout.trim();
                    if value.chars().any(|c| c.is_ascii_digit()) {
                        return Some(value.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => log::debug!("property {} unreadable: {}", prop, e),
            }
        }

        let content = match fs::read_to_string(&self.cfg.resolv_conf) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("{} unreadable: {}", self.cfg.resolv_conf, e);
                return None;
            }
        };

        content.lines().find_map(|line| {
            let value = line.trim().strip_prefix("nameserver")?.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    }
}
