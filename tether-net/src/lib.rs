//! Privileged network plumbing for the rutether reconciler
//!
//! This crate provides the low-level pieces the reconciliation engine is
//! built on: running privileged external commands, enumerating network
//! links and their IPv4 addresses, and a value model for iptables rules
//! with best-effort install/remove operations.
//!
//! # Design
//!
//! All kernel interaction goes through the [`CommandRunner`] trait so the
//! layers above can be driven against a mock in tests. The production
//! implementation is [`ShellRunner`]; a stateful [`mock::MockRunner`] that
//! emulates `iptables -C/-A/-D` semantics is available behind the
//! `test-util` feature.
//!
//! Rule operations are deliberately best-effort: a failed command is
//! logged and swallowed, never propagated. The reconciler must keep
//! running even when an individual rule operation fails (for example
//! because an equivalent rule already exists or was removed by hand).
//!
//! # Platform Requirements
//!
//! Linux with `iptables`/`ip6tables` and iproute2 installed; root or
//! `CAP_NET_ADMIN` for anything that mutates firewall state.

pub mod cmd;
pub mod error;
pub mod link;
pub mod rules;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use cmd::{CmdOutput, CommandRunner, ShellRunner};
pub use error::{Error, Result};
pub use link::{Ipv4Assignment, Link};
pub use rules::{Family, Firewall, Rule};

/// proc entry toggling global IPv4 forwarding
pub const IPV4_FORWARD_PROC: &str = "/proc/sys/net/ipv4/ip_forward";

/// proc entry toggling global IPv6 forwarding
pub const IPV6_FORWARD_PROC: &str = "/proc/sys/net/ipv6/conf/all/forwarding";
