//! Rutether Engine
//!
//! This crate provides the reconciliation engine that keeps a device's
//! tethered clients routed through whichever VPN interface is currently
//! active. It polls the interface topology, converges the kernel's
//! firewall/NAT state to the observed (tether, vpn, dns) triple, and
//! flushes everything it installed on shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      rutether-cli                        │
//! │        signals, logging init, config generation          │
//! └───────────────────────────┬──────────────────────────────┘
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    rutether-engine                       │
//! │  ┌───────────────────┐      ┌──────────────────────────┐ │
//! │  │ TopologyDetector  │─────▶│        Reconciler        │ │
//! │  │  vpn/tether/dns   │      │  applied state, ticking  │ │
//! │  └───────────────────┘      └───────────┬──────────────┘ │
//! │                                         ▼                │
//! │                             ┌──────────────────────────┐ │
//! │                             │         RuleSync         │ │
//! │                             │   apply / flush, clat    │ │
//! │                             └──────────────────────────┘ │
//! └───────────────────────────┬──────────────────────────────┘
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                       tether-net                         │
//! │     CommandRunner, link enumeration, firewall rules      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The whole system is one logical thread of control: detection,
//! decision and rule application for a tick complete before the next
//! tick starts, and the only mutable state is the reconciler's applied
//! topology.

pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod sync;

pub use config::{CommonConfig, Config, DetectConfig, RulesConfig};
pub use detect::{Topology, TopologyDetector};
pub use error::{Error, Result};
pub use event::{EngineEvent, EngineState, EventHandler, LoggingEventHandler};
pub use reconciler::Reconciler;
pub use sync::RuleSync;
