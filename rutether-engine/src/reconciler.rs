//! The reconciliation loop
//!
//! Owns the single piece of mutable state in the system: the topology
//! whose rules are currently installed. Every tick re-detects the live
//! topology, compares it with the applied one and converges the
//! firewall, always flushing the old rule set before applying a new one
//! so two topologies' NAT rules never coexist.

use std::sync::Arc;

use tokio::sync::broadcast;

use tether_net::cmd::{CommandRunner, ShellRunner};

use crate::config::Config;
use crate::detect::{Topology, TopologyDetector};
use crate::error::Result;
use crate::event::{EngineEvent, EngineState, EventHandler, LoggingEventHandler};
use crate::sync::RuleSync;

/// The reconciliation engine.
///
/// Runs detect → compare → converge passes on a fixed interval until the
/// shutdown broadcast fires, then flushes whatever is applied. A
/// best-effort flush also runs on drop, so no exit path leaves rules
/// behind.
pub struct Reconciler {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    detector: TopologyDetector,
    sync: RuleSync,
    applied: Option<Topology>,
    state: EngineState,
    event_handler: Arc<dyn EventHandler>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl Reconciler {
    /// Create a reconciler running real privileged commands
    pub fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, Arc::new(ShellRunner::new()))
    }

    /// Create a reconciler over a custom command runner
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;

        let detector = TopologyDetector::new(config.detect.clone(), Arc::clone(&runner));
        let sync = RuleSync::new(
            Arc::clone(&runner),
            config.detect.clat_interface.clone(),
            config.rules.ipv6_mirror,
        );

        Ok(Self {
            config,
            runner,
            detector,
            sync,
            applied: None,
            state: EngineState::Idle,
            event_handler: Arc::new(LoggingEventHandler),
            shutdown_tx: None,
        })
    }

    /// Set a custom event handler
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Get a shutdown handle that can be used to stop the loop from outside.
    ///
    /// Can be called before or after [`Reconciler::run`]; the same
    /// channel is reused.
    pub fn create_shutdown_handle(&mut self) -> broadcast::Sender<()> {
        if let Some(tx) = &self.shutdown_tx {
            return tx.clone();
        }
        let (tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(tx.clone());
        tx
    }

    /// The topology whose rules are currently installed
    pub fn applied(&self) -> Option<&Topology> {
        self.applied.as_ref()
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run the reconciliation loop until the shutdown broadcast fires.
    ///
    /// The applied rule set is flushed before this returns, whatever the
    /// shutdown cause.
    pub async fn run(&mut self) -> Result<()> {
        // Fail fast when the firewall binary itself is unusable; every
        // later failure is absorbed by the best-effort policy.
        if let Err(e) = self.runner.run("iptables", &["--version"]) {
            if e.is_permission_denied() {
                log::error!("cannot execute iptables, try running as root");
            }
            return Err(e.into());
        }

        let shutdown_tx = self.create_shutdown_handle();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let interval = self.config.common.poll_interval();

        log::info!(
            "reconciler started, polling every {}s",
            interval.as_secs()
        );

        loop {
            self.tick().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    log::info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.clear("shutdown").await;
        Ok(())
    }

    /// One detect → compare → converge pass.
    pub async fn tick(&mut self) {
        let mut observed = self.detector.detect();

        if !self.config.rules.dns_redirect {
            observed.dns = None;
        } else if let Some(dns) = &self.config.rules.dns_override {
            observed.dns = Some(dns.clone());
        }

        if observed.is_routable() {
            if self.applied.as_ref() == Some(&observed) {
                return;
            }
            if let Some(old) = self.applied.take() {
                self.sync.flush(&old);
                self.emit(EngineEvent::RulesFlushed {
                    topology: old,
                    reason: "topology changed".into(),
                })
                .await;
            }
            self.sync.apply(&observed);
            self.emit(EngineEvent::RulesApplied {
                topology: observed.clone(),
            })
            .await;
            self.applied = Some(observed);
            self.set_state(EngineState::Active).await;
        } else if self.applied.is_some() {
            self.clear("interface lost").await;
        } else {
            self.emit(EngineEvent::Waiting).await;
        }
    }

    /// Flush the applied rule set, if any, and return to idle.
    async fn clear(&mut self, reason: &str) {
        if let Some(old) = self.applied.take() {
            self.sync.flush(&old);
            self.emit(EngineEvent::RulesFlushed {
                topology: old,
                reason: reason.into(),
            })
            .await;
        }
        self.set_state(EngineState::Idle).await;
    }

    async fn set_state(&mut self, new: EngineState) {
        if new != self.state {
            self.emit(EngineEvent::StateChanged {
                old: self.state,
                new,
            })
            .await;
            self.state = new;
        }
    }

    async fn emit(&self, event: EngineEvent) {
        self.event_handler.on_event(event).await;
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(old) = self.applied.take() {
            log::warn!("flushing rules on drop: {}", old);
            self.sync.flush(&old);
        }
    }
}
