//! Configuration types for the tether reconciler

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
///
/// The configuration file uses TOML format. Every value has a default,
/// so an empty file is valid; the `[detect]` section exposes the
/// candidate lists the topology detector works through.
///
/// # Example Configuration
///
/// ```toml
/// [common]
/// poll_interval = 3
/// log_level = "info"
///
/// [detect]
/// vpn_interfaces = ["tun0", "wg0"]
/// tether_interfaces = ["wlan1", "ap0"]
///
/// [rules]
/// dns_redirect = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared engine settings
    #[serde(default)]
    pub common: CommonConfig,

    /// Topology detection tunables
    #[serde(default)]
    pub detect: DetectConfig,

    /// Rule generation tunables
    #[serde(default)]
    pub rules: RulesConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.common.poll_interval == 0 {
            return Err(Error::Config(
                "poll_interval must be at least 1 second".into(),
            ));
        }

        for net in &self.detect.tether_networks {
            net.parse::<Ipv4Net>().map_err(|e| {
                Error::Config(format!("invalid tether network '{}': {}", net, e))
            })?;
        }

        if self.detect.vpn_interfaces.is_empty() && self.detect.vpn_keywords.is_empty() {
            return Err(Error::Config(
                "no vpn_interfaces or vpn_keywords configured, nothing to detect".into(),
            ));
        }

        if let Some(dns) = &self.rules.dns_override {
            dns.parse::<IpAddr>().map_err(|_| {
                Error::Config(format!("dns_override '{}' is not an IP address", dns))
            })?;
        }

        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# rutether configuration
#
# All values shown are the defaults; an empty file works too.

[common]
# Seconds between reconciliation passes
poll_interval = 3

# Log level: "error", "warn", "info", "debug", "trace"
log_level = "info"

[detect]
# VPN interface names tried first, in priority order. When none exists,
# all links are scanned for tunnel-like attributes or name keywords.
vpn_interfaces = ["tun0", "tun1", "tun2", "ppp0", "wg0"]
vpn_keywords = ["tun", "tap", "ppp", "wg", "vpn"]

# Tether interface names tried first, in priority order. A candidate is
# accepted only while it carries an IPv4 address in tether_networks.
tether_interfaces = ["wlan1", "ap0", "swlan0", "wlan0", "rndis0", "ncm0"]
tether_keywords = ["wlan", "ap", "rndis", "ncm", "swlan", "usb"]
tether_networks = ["10.0.0.0/8", "192.168.0.0/16", "172.16.0.0/12"]

# System properties probed for the upstream DNS server, then the
# resolver file as a fallback.
dns_properties = ["net.dns1", "net.dns2", "dhcp.wlan0.dns1"]
resolv_conf = "/etc/resolv.conf"

# Interface whose presence indicates active IPv4-over-IPv6 translation;
# forward rules are mirrored into ip6tables while it exists.
clat_interface = "clat4"

[rules]
# Redirect tethered clients' port-53 traffic to the detected resolver
dns_redirect = true

# Fixed resolver overriding detection, e.g. "8.8.8.8"
# dns_override = ""

# Mirror forward rules into ip6tables while the clat interface exists
ipv6_mirror = true
"#
        .to_string()
    }
}

/// Shared engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Seconds between reconciliation passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Log level used when the CLI does not override it
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl CommonConfig {
    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Topology detection tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// VPN interface names, in priority order
    #[serde(default = "default_vpn_interfaces")]
    pub vpn_interfaces: Vec<String>,

    /// Name fragments identifying a VPN-style link in the fallback scan
    #[serde(default = "default_vpn_keywords")]
    pub vpn_keywords: Vec<String>,

    /// Tether interface names, in priority order
    #[serde(default = "default_tether_interfaces")]
    pub tether_interfaces: Vec<String>,

    /// Name fragments identifying a tether-style link in the fallback scan
    #[serde(default = "default_tether_keywords")]
    pub tether_keywords: Vec<String>,

    /// Private networks a tether candidate's IPv4 address must fall into
    #[serde(default = "default_tether_networks")]
    pub tether_networks: Vec<String>,

    /// System properties probed for the DNS server, in order
    #[serde(default = "default_dns_properties")]
    pub dns_properties: Vec<String>,

    /// Resolver configuration file used as the DNS fallback
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: String,

    /// Interface indicating active IPv4-over-IPv6 translation
    #[serde(default = "default_clat_interface")]
    pub clat_interface: String,
}

impl DetectConfig {
    /// The tether networks parsed into prefixes.
    ///
    /// [`Config::validate`] guarantees every entry parses; anything that
    /// does not is skipped here.
    pub fn networks(&self) -> Vec<Ipv4Net> {
        self.tether_networks
            .iter()
            .filter_map(|n| n.parse().ok())
            .collect()
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            vpn_interfaces: default_vpn_interfaces(),
            vpn_keywords: default_vpn_keywords(),
            tether_interfaces: default_tether_interfaces(),
            tether_keywords: default_tether_keywords(),
            tether_networks: default_tether_networks(),
            dns_properties: default_dns_properties(),
            resolv_conf: default_resolv_conf(),
            clat_interface: default_clat_interface(),
        }
    }
}

/// Rule generation tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Whether to install DNS DNAT rules at all
    #[serde(default = "default_true")]
    pub dns_redirect: bool,

    /// Fixed resolver overriding detection
    #[serde(default)]
    pub dns_override: Option<String>,

    /// Whether to mirror forward rules into ip6tables while the clat
    /// interface exists
    #[serde(default = "default_true")]
    pub ipv6_mirror: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dns_redirect: true,
            dns_override: None,
            ipv6_mirror: true,
        }
    }
}

fn default_poll_interval() -> u64 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vpn_interfaces() -> Vec<String> {
    ["tun0", "tun1", "tun2", "ppp0", "wg0"]
        .map(String::from)
        .to_vec()
}

fn default_vpn_keywords() -> Vec<String> {
    ["tun", "tap", "ppp", "wg", "vpn"].map(String::from).to_vec()
}

fn default_tether_interfaces() -> Vec<String> {
    ["wlan1", "ap0", "swlan0", "wlan0", "rndis0", "ncm0"]
        .map(String::from)
        .to_vec()
}

fn default_tether_keywords() -> Vec<String> {
    ["wlan", "ap", "rndis", "ncm", "swlan", "usb"]
        .map(String::from)
        .to_vec()
}

fn default_tether_networks() -> Vec<String> {
    ["10.0.0.0/8", "192.168.0.0/16", "172.16.0.0/12"]
        .map(String::from)
        .to_vec()
}

fn default_dns_properties() -> Vec<String> {
    ["net.dns1", "net.dns2", "dhcp.wlan0.dns1"]
        .map(String::from)
        .to_vec()
}

fn default_resolv_conf() -> String {
    "/etc/resolv.conf".to_string()
}

fn default_clat_interface() -> String {
    "clat4".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.common.poll_interval, 3);
        assert!(config.rules.dns_redirect);
        assert_eq!(config.detect.clat_interface, "clat4");
    }

    #[test]
    fn sample_config_parses() {
        let config = Config::from_toml(&Config::sample()).unwrap();
        assert_eq!(config.detect.vpn_interfaces[0], "tun0");
        assert_eq!(config.detect.networks().len(), 3);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = Config::from_toml("[common]\npoll_interval = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn bad_tether_network_is_rejected() {
        let err =
            Config::from_toml("[detect]\ntether_networks = [\"not-a-network\"]\n").unwrap_err();
        assert!(err.to_string().contains("not-a-network"));
    }

    #[test]
    fn bad_dns_override_is_rejected() {
        let err = Config::from_toml("[rules]\ndns_override = \"nonsense\"\n").unwrap_err();
        assert!(err.to_string().contains("dns_override"));
    }

    #[test]
    fn empty_detection_lists_are_rejected() {
        let err = Config::from_toml("[detect]\nvpn_interfaces = []\nvpn_keywords = []\n")
            .unwrap_err();
        assert!(err.to_string().contains("nothing to detect"));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = Config::from_toml("[common]\npoll_interval = 10\n").unwrap();
        assert_eq!(config.common.poll_interval().as_secs(), 10);
        assert_eq!(config.common.log_level, "info");
        assert!(!config.detect.tether_interfaces.is_empty());
    }
}
