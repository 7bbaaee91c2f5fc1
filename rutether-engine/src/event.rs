//! Engine state and events

use crate::detect::Topology;

/// Reconciler state
///
/// `Idle` means no rules are installed; `Active` means the rules for
/// exactly one topology are live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for both a tether and a VPN interface
    #[default]
    Idle,
    /// Rules for the current topology are installed
    Active,
}

impl EngineState {
    /// Whether rules are currently installed
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Active)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::Active => "Active",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Events emitted by the reconciler
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// State changed
    StateChanged {
        old: EngineState,
        new: EngineState,
    },

    /// Rules for a topology were installed
    RulesApplied {
        /// The topology now live
        topology: Topology,
    },

    /// Rules for a topology were removed
    RulesFlushed {
        /// The topology whose rules were removed
        topology: Topology,
        /// Why the rules were removed
        reason: String,
    },

    /// Nothing to do: no routable topology and no rules installed
    Waiting,
}

/// Event handler trait for receiving reconciler events
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a reconciler event
    async fn on_event(&self, event: EngineEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged { old, new } => {
                log::info!("state: {} -> {}", old, new);
            }
            EngineEvent::RulesApplied { topology } => {
                log::info!("forwarding active: {}", topology);
            }
            EngineEvent::RulesFlushed { topology, reason } => {
                log::info!("forwarding stopped ({}): {}", reason, topology);
            }
            EngineEvent::Waiting => {
                log::debug!("waiting for tether and vpn interfaces");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(EngineState::default(), EngineState::Idle);
        assert!(!EngineState::default().is_active());
    }

    #[test]
    fn state_display() {
        assert_eq!(EngineState::Active.to_string(), "Active");
        assert_eq!(EngineState::Idle.to_string(), "Idle");
    }
}
