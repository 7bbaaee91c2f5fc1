//! Network link and address enumeration
//!
//! Thin wrappers around `ip -o link show` and `ip -o -4 addr show` plus a
//! direct `if_nametoindex` existence probe. The one-line (`-o`) output
//! format is stable enough to split on whitespace.

use std::ffi::CString;
use std::net::Ipv4Addr;

use crate::cmd::CommandRunner;
use crate::error::{Error, Result};

/// A network link reported by `ip -o link show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Interface name, with any `@parent` suffix stripped
    pub name: String,
    /// Remainder of the line: flags, state, link-layer type
    pub attributes: String,
}

impl Link {
    /// Whether the link looks like a tunnel endpoint.
    ///
    /// TUN devices carry the `POINTOPOINT` flag and report `link/none`
    /// as their link-layer type; WireGuard devices report `link/none`
    /// without the flag.
    pub fn is_tunnel_like(&self) -> bool {
        self.attributes.contains("POINTOPOINT") || self.attributes.contains("link/none")
    }
}

/// One IPv4 address assignment reported by `ip -o -4 addr show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Assignment {
    /// Interface the address is assigned to
    pub interface: String,
    /// The assigned address, without its prefix length
    pub address: Ipv4Addr,
}

/// Check whether an interface with this name currently exists.
pub fn interface_exists(name: &str) -> bool {
    let Ok(c_name) = CString::new(name) else {
        return false;
    };

    // SAFETY: if_nametoindex is safe to call with a valid C string
    unsafe { libc::if_nametoindex(c_name.as_ptr()) != 0 }
}

/// List all network links.
pub fn list_links(runner: &dyn CommandRunner) -> Result<Vec<Link>> {
    let out = runner.run("ip", &["-o", "link", "show"])?;
    if !out.success {
        return Err(Error::Enumeration(format!(
            "ip link show failed: {}",
            out.stderr.trim()
        )));
    }
    Ok(parse_links(&out.stdout))
}

/// List all IPv4 address assignments.
pub fn list_ipv4_addrs(runner: &dyn CommandRunner) -> Result<Vec<Ipv4Assignment>> {
    let out = runner.run("ip", &["-o", "-4", "addr", "show"])?;
    if !out.success {
        return Err(Error::Enumeration(format!(
            "ip addr show failed: {}",
            out.stderr.trim()
        )));
    }
    Ok(parse_ipv4_addrs(&out.stdout))
}

/// Parse `ip -o link show` output.
///
/// Lines look like:
/// `2: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... link/ether aa:bb:...`
fn parse_links(text: &str) -> Vec<Link> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let _index = parts.next()?;
            let name = parts.next()?.trim();
            let name = name.split('@').next().unwrap_or(name);
            if name.is_empty() {
                return None;
            }
            Some(Link {
                name: name.to_string(),
                attributes: parts.next().unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

/// Parse `ip -o -4 addr show` output.
///
/// Lines look like:
/// `5: wlan0    inet 192.168.43.1/24 brd 192.168.43.255 scope global wlan0`
fn parse_ipv4_addrs(text: &str) -> Vec<Ipv4Assignment> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _index = fields.next()?;
            let name = fields.next()?.trim_end_matches(':');
            let name = name.split('@').next().unwrap_or(name);

            while let Some(field) = fields.next() {
                if field == "inet" {
                    let cidr = fields.next()?;
                    let address = cidr.split('/').next()?.parse().ok()?;
                    return Some(Ipv4Assignment {
                        interface: name.to_string(),
                        address,
                    });
                }
            }
            None
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKS: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DORMANT group default qlen 3000\\    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
14: tun0: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UNKNOWN mode DEFAULT group default qlen 500\\    link/none
15: v4-wlan0@wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1472 qdisc noqueue state UP mode DEFAULT group default qlen 1000\\    link/ether 11:22:33:44:55:66
";

    const ADDRS: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: wlan0    inet 192.168.43.1/24 brd 192.168.43.255 scope global wlan0\\       valid_lft forever preferred_lft forever
14: tun0    inet 10.64.0.2/32 scope global tun0\\       valid_lft forever preferred_lft forever
";

    #[test]
    fn parses_link_names_and_attributes() {
        let links = parse_links(LINKS);
        let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["lo", "wlan0", "tun0", "v4-wlan0"]);
    }

    #[test]
    fn strips_parent_suffix() {
        let links = parse_links(LINKS);
        assert!(links.iter().any(|l| l.name == "v4-wlan0"));
        assert!(!links.iter().any(|l| l.name.contains('@')));
    }

    #[test]
    fn tunnel_detection_by_flags_and_link_layer() {
        let links = parse_links(LINKS);
        let tun = links.iter().find(|l| l.name == "tun0").unwrap();
        let wlan = links.iter().find(|l| l.name == "wlan0").unwrap();
        assert!(tun.is_tunnel_like());
        assert!(!wlan.is_tunnel_like());
    }

    #[test]
    fn parses_ipv4_assignments() {
        let addrs = parse_ipv4_addrs(ADDRS);
        assert_eq!(addrs.len(), 3);
        assert_eq!(addrs[1].interface, "wlan0");
        assert_eq!(addrs[1].address, Ipv4Addr::new(192, 168, 43, 1));
    }

    #[test]
    fn skips_garbage_lines() {
        let addrs = parse_ipv4_addrs("not an ip line\n\n2: eth0    inet 10.1.2.3/16 scope global\n");
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].interface, "eth0");
    }

    #[test]
    fn loopback_exists() {
        assert!(interface_exists("lo"));
    }

    #[test]
    fn bogus_interface_does_not_exist() {
        assert!(!interface_exists("rutether-test-none0"));
    }
}
