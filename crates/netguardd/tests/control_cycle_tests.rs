//! End-to-end control cycle tests against in-memory collaborators.
//!
//! The managed device, gateway probes, command surface and graph store are
//! all faked, so each test drives `Controller::run_cycle` directly and
//! inspects the commands and snapshots that come out.

use async_trait::async_trait;
use netguard_common::snapshot::Snapshot;
use netguard_common::types::OperStatus;
use netguardd::actions::{ActionError, ChangeReason, CommandRunner, Dispatcher, RouteChange};
use netguardd::config::Config;
use netguardd::controller::Controller;
use netguardd::liveness::Prober;
use netguardd::store::{SnapshotStore, StoreError};
use netguardd::telemetry::{
    ManagementSession, TelemetryError, OID_IF_ADMIN_STATUS, OID_IF_DESCR, OID_IF_IN_OCTETS,
    OID_IF_OPER_STATUS, OID_IF_OUT_OCTETS, OID_ROUTE_IF_INDEX, OID_ROUTE_NEXT_HOP,
};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const PRIMARY: &str = "172.25.0.101";
const BACKUP: &str = "172.25.0.102";

/// In-memory SNMP agent: canned walk tables plus a set-operation log.
#[derive(Default)]
struct FakeSession {
    tables: Mutex<HashMap<String, BTreeMap<String, String>>>,
    sets: Mutex<Vec<(String, char, String)>>,
}

impl FakeSession {
    fn load(&self, device: &DeviceState) {
        *self.tables.lock().unwrap() = device.tables();
    }

    fn sets(&self) -> Vec<(String, char, String)> {
        self.sets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManagementSession for FakeSession {
    async fn walk(&self, oid: &str) -> Result<BTreeMap<String, String>, TelemetryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(oid)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, _oid: &str) -> Result<Option<String>, TelemetryError> {
        Ok(None)
    }

    async fn set(&self, oid: &str, type_tag: char, value: &str) -> Result<(), TelemetryError> {
        self.sets
            .lock()
            .unwrap()
            .push((oid.to_string(), type_tag, value.to_string()));
        Ok(())
    }
}

/// Probe results controlled per test, per gateway.
struct FakeProber {
    alive: Mutex<(bool, bool)>,
}

impl FakeProber {
    fn new(primary: bool, backup: bool) -> Self {
        Self {
            alive: Mutex::new((primary, backup)),
        }
    }

    fn set(&self, primary: bool, backup: bool) {
        *self.alive.lock().unwrap() = (primary, backup);
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, target: Ipv4Addr) -> bool {
        let (primary, backup) = *self.alive.lock().unwrap();
        if target.to_string() == PRIMARY {
            primary
        } else if target.to_string() == BACKUP {
            backup
        } else {
            false
        }
    }
}

/// Records every device command, accepting them all.
#[derive(Default)]
struct RecordingRunner {
    commands: Mutex<Vec<String>>,
}

impl RecordingRunner {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn route_commands(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("ip route"))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str) -> Result<String, ActionError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(String::new())
    }
}

/// Models the device's route table with replace (create-or-overwrite)
/// semantics, keyed by destination.
#[derive(Default)]
struct RouteTableRunner {
    table: Mutex<BTreeMap<String, String>>,
}

impl RouteTableRunner {
    fn table(&self) -> BTreeMap<String, String> {
        self.table.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RouteTableRunner {
    async fn run(&self, command: &str) -> Result<String, ActionError> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        if tokens.len() > 4 && tokens[..3] == ["ip", "route", "replace"] {
            self.table
                .lock()
                .unwrap()
                .insert(tokens[3].to_string(), tokens[4..].join(" "));
        }
        Ok(String::new())
    }
}

/// Records published snapshots.
#[derive(Default)]
struct RecordingStore {
    snapshots: Mutex<Vec<Snapshot>>,
}

impl RecordingStore {
    fn last(&self) -> Snapshot {
        self.snapshots.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Mutable model of the managed device, rendered into SNMP walk tables.
#[derive(Clone)]
struct DeviceState {
    // (index, name, admin "1"/"2", oper "1"/"2", in_octets, out_octets)
    interfaces: Vec<(u32, String, String, String, u64, u64)>,
    // (destination, next hop, owning ifIndex)
    routes: Vec<(String, String, u32)>,
}

impl DeviceState {
    fn lab() -> Self {
        Self {
            interfaces: vec![
                (1, "lo".into(), "1".into(), "1".into(), 0, 0),
                (2, "veth0".into(), "1".into(), "1".into(), 1_000, 1_000),
                (3, "veth1".into(), "1".into(), "1".into(), 1_000, 1_000),
                (4, "veth2".into(), "1".into(), "1".into(), 1_000, 1_000),
            ],
            routes: vec![
                ("10.100.2.0".into(), PRIMARY.into(), 2),
                ("10.100.3.0".into(), BACKUP.into(), 3),
                ("10.100.4.0".into(), PRIMARY.into(), 4),
            ],
        }
    }

    fn bump_counters(&mut self, index: u32, delta: u64) {
        for itf in &mut self.interfaces {
            if itf.0 == index {
                itf.4 += delta;
                itf.5 += delta;
            }
        }
    }

    fn tables(&self) -> HashMap<String, BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        let mut admin = BTreeMap::new();
        let mut oper = BTreeMap::new();
        let mut in_octets = BTreeMap::new();
        let mut out_octets = BTreeMap::new();
        for (index, name, adm, op, inn, out) in &self.interfaces {
            let key = index.to_string();
            names.insert(key.clone(), name.clone());
            admin.insert(key.clone(), adm.clone());
            oper.insert(key.clone(), op.clone());
            in_octets.insert(key.clone(), inn.to_string());
            out_octets.insert(key, out.to_string());
        }
        let mut next_hop = BTreeMap::new();
        let mut route_if = BTreeMap::new();
        for (dest, hop, index) in &self.routes {
            next_hop.insert(dest.clone(), hop.clone());
            route_if.insert(dest.clone(), index.to_string());
        }
        HashMap::from([
            (OID_IF_DESCR.to_string(), names),
            (OID_IF_ADMIN_STATUS.to_string(), admin),
            (OID_IF_OPER_STATUS.to_string(), oper),
            (OID_IF_IN_OCTETS.to_string(), in_octets),
            (OID_IF_OUT_OCTETS.to_string(), out_octets),
            (OID_ROUTE_NEXT_HOP.to_string(), next_hop),
            (OID_ROUTE_IF_INDEX.to_string(), route_if),
        ])
    }
}

struct Harness {
    controller: Controller,
    session: Arc<FakeSession>,
    prober: Arc<FakeProber>,
    runner: Arc<RecordingRunner>,
    store: Arc<RecordingStore>,
    _trigger_dir: TempDir,
    trigger_dir: std::path::PathBuf,
}

fn harness(device: &DeviceState) -> Harness {
    let trigger_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.poll.trigger_dir = trigger_dir.path().to_path_buf();

    let session = Arc::new(FakeSession::default());
    session.load(device);
    let prober = Arc::new(FakeProber::new(true, true));
    let runner = Arc::new(RecordingRunner::default());
    let store = Arc::new(RecordingStore::default());

    let controller = Controller::new(
        config,
        Arc::clone(&session) as Arc<dyn ManagementSession>,
        Arc::clone(&prober) as Arc<dyn Prober>,
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
    );

    let dir = trigger_dir.path().to_path_buf();
    Harness {
        controller,
        session,
        prober,
        runner,
        store,
        _trigger_dir: trigger_dir,
        trigger_dir: dir,
    }
}

#[tokio::test]
async fn test_steady_state_cycle_mutates_nothing() {
    let device = DeviceState::lab();
    let mut h = harness(&device);

    let snapshot = h.controller.run_cycle().await;

    assert!(h.runner.route_commands().is_empty());
    assert!(h.session.sets().is_empty());
    assert_eq!(snapshot.cycle, 1);
    assert_eq!(snapshot.up_count(), 3);
}

#[tokio::test]
async fn test_blackout_publishes_down_and_freezes_routes() {
    let device = DeviceState::lab();
    let mut h = harness(&device);
    h.prober.set(false, false);

    let snapshot = h.controller.run_cycle().await;

    // No route mutation of any kind
    assert!(h.runner.route_commands().is_empty());
    // Every interface published DOWN despite healthy link state
    assert!(snapshot
        .interfaces
        .iter()
        .all(|r| r.status == OperStatus::Down));
    assert!(snapshot.diagnostic.contains("Both gateways unreachable"));
    assert_eq!(h.store.last().cycle, snapshot.cycle);
}

#[tokio::test]
async fn test_failover_moves_routes_off_dead_primary() {
    let device = DeviceState::lab();
    let mut h = harness(&device);
    h.prober.set(false, true);

    h.controller.run_cycle().await;

    let routes = h.runner.route_commands();
    // Interfaces 2 and 4 were on the primary
    assert_eq!(routes.len(), 2);
    assert!(routes
        .iter()
        .any(|c| c.contains("10.100.2.0/24") && c.contains(BACKUP) && c.contains("dev veth0")));
    assert!(routes
        .iter()
        .any(|c| c.contains("10.100.4.0/24") && c.contains(BACKUP)));
    assert!(routes.iter().all(|c| c.ends_with("onlink")));
}

#[tokio::test]
async fn test_replace_route_is_idempotent() {
    let runner = Arc::new(RouteTableRunner::default());
    let session = Arc::new(FakeSession::default());
    let dispatcher = Dispatcher::new(
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        Arc::clone(&session) as Arc<dyn ManagementSession>,
    );
    let change = RouteChange {
        dest_cidr: "10.100.2.0/24".into(),
        gateway: BACKUP.parse().unwrap(),
        if_index: 2,
        if_name: "veth0".into(),
        reason: ChangeReason::Failover,
    };

    assert!(dispatcher.replace_route(&change).await);
    let after_once = runner.table();
    assert_eq!(after_once.len(), 1);
    assert!(after_once.get("10.100.2.0/24").unwrap().contains(BACKUP));

    // Reissuing the identical change overwrites in place: same final state
    assert!(dispatcher.replace_route(&change).await);
    assert_eq!(runner.table(), after_once);
}

#[tokio::test]
async fn test_identical_failover_cycles_leave_identical_route_table() {
    let device = DeviceState::lab();
    let trigger_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.poll.trigger_dir = trigger_dir.path().to_path_buf();

    let session = Arc::new(FakeSession::default());
    session.load(&device);
    let prober = Arc::new(FakeProber::new(false, true));
    let runner = Arc::new(RouteTableRunner::default());
    let store = Arc::new(RecordingStore::default());
    let mut controller = Controller::new(
        config,
        Arc::clone(&session) as Arc<dyn ManagementSession>,
        prober as Arc<dyn Prober>,
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        store as Arc<dyn SnapshotStore>,
    );

    controller.run_cycle().await;
    let after_once = runner.table();
    assert!(after_once.get("10.100.2.0/24").unwrap().contains(BACKUP));
    assert!(after_once.get("10.100.4.0/24").unwrap().contains(BACKUP));

    // The device still reports the stale routes, so the next cycle
    // recomputes and reissues the same plan; the table must not change.
    controller.run_cycle().await;
    assert_eq!(runner.table(), after_once);
}

#[tokio::test]
async fn test_failback_restores_only_ideal_routes() {
    let mut device = DeviceState::lab();
    // Everything parked on the backup, as after a failover
    for route in &mut device.routes {
        route.1 = BACKUP.into();
    }
    let mut h = harness(&device);

    h.controller.run_cycle().await;

    let routes = h.runner.route_commands();
    // Even indices 2 and 4 come home; odd index 3 already sits on its
    // desired gateway.
    assert_eq!(routes.len(), 2);
    assert!(routes.iter().all(|c| c.contains(PRIMARY)));
    assert!(!routes.iter().any(|c| c.contains("10.100.3.0/24")));
}

#[tokio::test]
async fn test_repair_installs_route_for_routeless_up_interface() {
    let mut device = DeviceState::lab();
    device.routes.retain(|r| r.2 != 4);
    let mut h = harness(&device);

    h.controller.run_cycle().await;

    let routes = h.runner.route_commands();
    assert_eq!(routes.len(), 1);
    assert!(routes[0].contains("10.100.4.0/24"));
    assert!(routes[0].contains(PRIMARY)); // idx 4 is even: primary
    assert!(routes[0].contains("dev veth2"));
}

#[tokio::test]
async fn test_quarantine_is_one_shot_and_gated_on_admin() {
    let mut device = DeviceState::lab();
    let mut h = harness(&device);

    // Cycle 1 establishes counter baselines
    h.controller.run_cycle().await;
    assert!(h.session.sets().is_empty());

    // Large counter jump on veth0: far above 10 MiB/s at any cycle length
    device.bump_counters(2, 50_000_000_000);
    h.session.load(&device);
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.controller.run_cycle().await;

    let sets = h.session.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].0, format!("{}.2", OID_IF_ADMIN_STATUS));
    assert_eq!(sets[0].1, 'i');
    assert_eq!(sets[0].2, "2");

    // Sustained breach while already shut down: no repeat command
    device.bump_counters(2, 50_000_000_000);
    device.interfaces[1].2 = "2".into(); // agent now reports admin down
    h.session.load(&device);
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.controller.run_cycle().await;
    assert_eq!(h.session.sets().len(), 1);
}

#[tokio::test]
async fn test_reset_trigger_reenables_admin_and_link() {
    let mut device = DeviceState::lab();
    let mut h = harness(&device);

    // Drive veth0 into quarantine first
    h.controller.run_cycle().await;
    device.bump_counters(2, 50_000_000_000);
    h.session.load(&device);
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.controller.run_cycle().await;
    assert_eq!(h.session.sets().len(), 1);

    std::fs::write(h.trigger_dir.join("reset.trigger"), b"").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.controller.run_cycle().await;

    // Admin up for all three managed interfaces
    let admin_ups: Vec<_> = h
        .session
        .sets()
        .into_iter()
        .skip(1)
        .filter(|(_, _, v)| v == "1")
        .collect();
    assert_eq!(admin_ups.len(), 3);

    // Link layer re-enabled too
    let links: Vec<String> = h
        .runner
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("ip link set"))
        .collect();
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|c| c.ends_with(" up")));

    // Trigger consumed
    assert!(!h.trigger_dir.join("reset.trigger").exists());
}

#[tokio::test]
async fn test_rebalance_trigger_alternates_gateways_deterministically() {
    let mut device = DeviceState::lab();
    // Four up interfaces, all routed to the primary: maximally skewed
    device.interfaces.push((5, "veth3".into(), "1".into(), "1".into(), 0, 0));
    device.routes = vec![
        ("10.100.2.0".into(), PRIMARY.into(), 2),
        ("10.100.3.0".into(), PRIMARY.into(), 3),
        ("10.100.4.0".into(), PRIMARY.into(), 4),
        ("10.100.5.0".into(), PRIMARY.into(), 5),
    ];
    let mut h = harness(&device);

    std::fs::write(h.trigger_dir.join("rebalance.trigger"), b"").unwrap();
    h.controller.run_cycle().await;

    // Failback wants 3 and 5 on the backup; rebalance then rewrites all
    // four in index order: 2->primary, 3->backup, 4->primary, 5->backup.
    let routes = h.runner.route_commands();
    let rebalance: Vec<&String> = routes.iter().rev().take(4).collect();
    let rebalance: Vec<&String> = rebalance.into_iter().rev().collect();
    assert!(rebalance[0].contains("10.100.2.0/24") && rebalance[0].contains(PRIMARY));
    assert!(rebalance[1].contains("10.100.3.0/24") && rebalance[1].contains(BACKUP));
    assert!(rebalance[2].contains("10.100.4.0/24") && rebalance[2].contains(PRIMARY));
    assert!(rebalance[3].contains("10.100.5.0/24") && rebalance[3].contains(BACKUP));

    assert!(!h.trigger_dir.join("rebalance.trigger").exists());
}

#[tokio::test]
async fn test_rebalance_during_blackout_defers_until_recovery() {
    let device = DeviceState::lab();
    let mut h = harness(&device);

    std::fs::write(h.trigger_dir.join("rebalance.trigger"), b"").unwrap();
    h.prober.set(false, false);
    h.controller.run_cycle().await;

    // Consumed but not executed
    assert!(!h.trigger_dir.join("rebalance.trigger").exists());
    assert!(h.runner.route_commands().is_empty());

    // Both gateways back: the deferred rebalance runs now
    h.prober.set(true, true);
    h.controller.run_cycle().await;
    assert_eq!(h.runner.route_commands().len(), 3);
}

#[tokio::test]
async fn test_topology_warning_on_skewed_load() {
    let mut device = DeviceState::lab();
    for route in &mut device.routes {
        route.1 = PRIMARY.into();
    }
    let mut h = harness(&device);

    let snapshot = h.controller.run_cycle().await;
    // 3 on primary, 0 on backup, no isolation
    assert_eq!(
        snapshot.topology.severity,
        netguard_common::TopologySeverity::Warning
    );
    assert_eq!(snapshot.topology.gateway_load.get(PRIMARY), Some(&3));
    assert_eq!(snapshot.topology.gateway_load.get(BACKUP), Some(&0));
}

#[tokio::test]
async fn test_snapshot_carries_gateway_edges_and_rates() {
    let mut device = DeviceState::lab();
    let mut h = harness(&device);

    h.controller.run_cycle().await;
    device.bump_counters(2, 4_096);
    h.session.load(&device);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = h.controller.run_cycle().await;

    let veth0 = snapshot
        .interfaces
        .iter()
        .find(|r| r.name == "veth0")
        .unwrap();
    assert_eq!(veth0.gateway, Some(PRIMARY.parse().unwrap()));
    assert!(veth0.in_rate_mibps > 0.0);
    // Loopback never published
    assert!(snapshot.interfaces.iter().all(|r| r.name != "lo"));
}
