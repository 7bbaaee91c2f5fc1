//! End-to-end reconciliation scenarios
//!
//! Drives the reconciler against the stateful mock runner, which
//! emulates iptables rule state, and asserts the convergence properties
//! the engine guarantees: no duplicate rules, no rules from a superseded
//! topology, nothing left behind after shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rutether_engine::{Config, EngineEvent, EngineState, EventHandler, Reconciler};
use tether_net::cmd::{CmdOutput, CommandRunner};
use tether_net::mock::MockRunner;

const LINKS_TUN: &str = "\
1: lo: <LOOPBACK,UP> link/loopback\n\
2: wlan0: <BROADCAST,UP> link/ether aa:bb:cc:dd:ee:ff\n\
3: tun0: <POINTOPOINT,UP> link/none\n";

const LINKS_WG: &str = "\
1: lo: <LOOPBACK,UP> link/loopback\n\
2: wlan0: <BROADCAST,UP> link/ether aa:bb:cc:dd:ee:ff\n\
4: wg0: <POINTOPOINT,NOARP,UP> link/none\n";

const LINKS_NO_VPN: &str = "\
1: lo: <LOOPBACK,UP> link/loopback\n\
2: wlan0: <BROADCAST,UP> link/ether aa:bb:cc:dd:ee:ff\n";

const ADDRS: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\n\
2: wlan0    inet 192.168.43.1/24 scope global wlan0\n";

fn test_config() -> Config {
    Config::from_toml(
        r#"
[common]
poll_interval = 1

[detect]
vpn_interfaces = ["rutether-test-tun9"]
resolv_conf = "/rutether-test-does-not-exist"
"#,
    )
    .unwrap()
}

fn mock_with(links: &str, dns: &str) -> Arc<MockRunner> {
    let mock = Arc::new(MockRunner::new());
    mock.respond("ip -o link show", CmdOutput::ok(links));
    mock.respond("ip -o -4 addr show", CmdOutput::ok(ADDRS));
    mock.respond("getprop net.dns1", CmdOutput::ok(dns));
    mock
}

fn reconciler_with(mock: &Arc<MockRunner>) -> Reconciler {
    Reconciler::with_runner(test_config(), Arc::clone(mock) as Arc<dyn CommandRunner>).unwrap()
}

#[tokio::test]
async fn full_topology_installs_expected_rules() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;

    assert!(mock.has_rule("FORWARD -i wlan0 -o tun0 -j ACCEPT"));
    assert!(mock.has_rule("FORWARD -i tun0 -o wlan0 -m state --state RELATED,ESTABLISHED -j ACCEPT"));
    assert!(mock.has_rule("POSTROUTING -o tun0 -j MASQUERADE"));
    assert!(mock.has_rule("-p udp --dport 53 -j DNAT --to-destination 8.8.8.8"));
    assert!(mock.has_rule("-p tcp --dport 53 -j DNAT --to-destination 8.8.8.8"));
    assert!(mock.has_rule("INPUT -i wlan0 -j ACCEPT"));

    assert_eq!(engine.state(), EngineState::Active);
    let applied = engine.applied().unwrap();
    assert_eq!(applied.tether.as_deref(), Some("wlan0"));
    assert_eq!(applied.vpn.as_deref(), Some("tun0"));
}

#[tokio::test]
async fn vpn_loss_flushes_everything() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;
    assert!(!mock.installed_rules().is_empty());

    mock.respond("ip -o link show", CmdOutput::ok(LINKS_NO_VPN));
    engine.tick().await;

    assert!(mock.installed_rules().is_empty());
    assert!(engine.applied().is_none());
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn vpn_switch_replaces_only_vpn_rules() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;

    mock.respond("ip -o link show", CmdOutput::ok(LINKS_WG));
    engine.tick().await;

    let rules = mock.installed_rules();
    assert!(!rules.iter().any(|r| r.contains("tun0")));
    assert!(rules.iter().any(|r| r.contains("-i wlan0 -o wg0")));
    assert!(rules.iter().any(|r| r.contains("POSTROUTING -o wg0 -j MASQUERADE")));

    // wlan0-only rules must appear exactly once.
    let input_accepts = rules
        .iter()
        .filter(|r| r.contains("INPUT -i wlan0"))
        .count();
    assert_eq!(input_accepts, 1);
}

#[tokio::test]
async fn identical_topology_applies_once() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;
    engine.tick().await;
    engine.tick().await;

    assert_eq!(mock.count_calls("iptables -A FORWARD -i wlan0 -o tun0"), 1);
    assert_eq!(mock.installed_rules().len(), 6);
}

#[tokio::test]
async fn missing_dns_installs_no_dnat() {
    let mock = mock_with(LINKS_TUN, "");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;

    assert!(!mock.installed_rules().iter().any(|r| r.contains("DNAT")));
    assert_eq!(engine.applied().unwrap().dns, None);
}

#[tokio::test]
async fn dns_override_wins_over_detection() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut config = test_config();
    config.rules.dns_override = Some("1.1.1.1".into());
    let mut engine =
        Reconciler::with_runner(config, Arc::clone(&mock) as Arc<dyn CommandRunner>).unwrap();

    engine.tick().await;

    assert!(mock.has_rule("--to-destination 1.1.1.1"));
    assert!(!mock.has_rule("--to-destination 8.8.8.8"));
}

#[tokio::test]
async fn dns_redirect_disabled_installs_no_dnat() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut config = test_config();
    config.rules.dns_redirect = false;
    let mut engine =
        Reconciler::with_runner(config, Arc::clone(&mock) as Arc<dyn CommandRunner>).unwrap();

    engine.tick().await;

    assert!(!mock.installed_rules().iter().any(|r| r.contains("DNAT")));
}

#[tokio::test]
async fn waiting_when_nothing_detected() {
    let mock = Arc::new(MockRunner::new());
    mock.respond("ip -o link show", CmdOutput::ok(LINKS_NO_VPN));
    mock.respond("ip -o -4 addr show", CmdOutput::ok(""));
    let mut engine = reconciler_with(&mock);

    engine.tick().await;

    assert!(mock.installed_rules().is_empty());
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn convergence_across_flapping_topologies() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    // tun0 -> gone -> wg0 -> gone; the end state must be empty.
    engine.tick().await;
    mock.respond("ip -o link show", CmdOutput::ok(LINKS_NO_VPN));
    engine.tick().await;
    mock.respond("ip -o link show", CmdOutput::ok(LINKS_WG));
    engine.tick().await;
    mock.respond("ip -o link show", CmdOutput::ok(LINKS_NO_VPN));
    engine.tick().await;

    assert!(mock.installed_rules().is_empty());
    assert!(engine.applied().is_none());
}

#[tokio::test]
async fn drop_flushes_applied_rules() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);

    engine.tick().await;
    assert!(!mock.installed_rules().is_empty());

    drop(engine);
    assert!(mock.installed_rules().is_empty());
}

#[tokio::test]
async fn shutdown_signal_stops_the_loop_and_flushes() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let mut engine = reconciler_with(&mock);
    let shutdown_tx = engine.create_shutdown_handle();

    let handle = tokio::spawn(async move { engine.run().await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(mock.has_rule("POSTROUTING -o tun0 -j MASQUERADE"));

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine did not stop")
        .unwrap()
        .unwrap();

    assert!(mock.installed_rules().is_empty());
}

struct CollectingHandler {
    events: Mutex<Vec<EngineEvent>>,
}

#[async_trait]
impl EventHandler for CollectingHandler {
    async fn on_event(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn events_track_state_transitions() {
    let mock = mock_with(LINKS_TUN, "8.8.8.8\n");
    let handler = Arc::new(CollectingHandler {
        events: Mutex::new(Vec::new()),
    });
    let mut engine = reconciler_with(&mock).with_event_handler(Arc::clone(&handler) as _);

    engine.tick().await;
    mock.respond("ip -o link show", CmdOutput::ok(LINKS_NO_VPN));
    engine.tick().await;

    let events = handler.events.lock().unwrap();
    assert!(matches!(events[0], EngineEvent::RulesApplied { .. }));
    assert!(matches!(
        events[1],
        EngineEvent::StateChanged {
            old: EngineState::Idle,
            new: EngineState::Active
        }
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::RulesFlushed { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::StateChanged {
            old: EngineState::Active,
            new: EngineState::Idle
        }
    )));
}
