//! The control loop.
//!
//! One cycle: consume triggers, observe the device and both gateways,
//! update rates and quarantine state, correct routing, then publish an
//! internally consistent snapshot. Every stage is best-effort; a cycle
//! always runs to the publish step with whatever it observed.

use crate::actions::{CommandRunner, Dispatcher};
use crate::balancer;
use crate::config::Config;
use crate::failover;
use crate::liveness::{LivenessTracker, LivenessView, Prober};
use crate::quarantine::QuarantineGuard;
use crate::rates::RateEstimator;
use crate::repair;
use crate::store::SnapshotStore;
use crate::telemetry::{self, ManagementSession};
use crate::topology;
use crate::triggers::{ControlSignal, TriggerQueue};
use chrono::Utc;
use netguard_common::snapshot::{bps_to_mibps, InterfaceRecord, Snapshot};
use netguard_common::types::{IfIndex, OperStatus};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub struct Controller {
    config: Config,
    session: Arc<dyn ManagementSession>,
    prober: Arc<dyn Prober>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Dispatcher,
    rates: RateEstimator,
    guard: QuarantineGuard,
    liveness: LivenessTracker,
    triggers: TriggerQueue,
    last_cycle: Option<Instant>,
    cycle: u64,
    /// A consumed rebalance trigger waiting for both gateways to be
    /// reachable.
    pending_rebalance: bool,
}

impl Controller {
    pub fn new(
        config: Config,
        session: Arc<dyn ManagementSession>,
        prober: Arc<dyn Prober>,
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let guard = QuarantineGuard::new(
            config.anomaly.threshold_bps(),
            Duration::from_secs(config.anomaly.quarantine_secs),
        );
        let liveness = LivenessTracker::new(config.gateways.failure_threshold);
        let triggers = TriggerQueue::new(config.poll.trigger_dir.clone());
        let dispatcher = Dispatcher::new(runner, Arc::clone(&session));
        Self {
            config,
            session,
            prober,
            store,
            dispatcher,
            rates: RateEstimator::new(),
            guard,
            liveness,
            triggers,
            last_cycle: None,
            cycle: 0,
            pending_rebalance: false,
        }
    }

    /// Run cycles forever at the configured cadence.
    pub async fn run(&mut self) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poll.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "Control loop started: device {}, gateways {} / {}",
            self.config.device.host, self.config.gateways.primary, self.config.gateways.backup
        );
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Execute one full control cycle and return the published snapshot.
    pub async fn run_cycle(&mut self) -> Snapshot {
        self.cycle += 1;
        let now = Instant::now();
        let elapsed = self
            .last_cycle
            .map(|t| now.duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_cycle = Some(now);

        let signals = self.triggers.poll();
        if signals.contains(&ControlSignal::Rebalance) {
            self.pending_rebalance = true;
        }
        let reset_requested = signals.contains(&ControlSignal::ResetAnomaly);

        let primary = self.config.gateways.primary;
        let backup = self.config.gateways.backup;
        let (telemetry, probe_primary, probe_backup) = tokio::join!(
            telemetry::collect(&*self.session),
            self.prober.probe(primary),
            self.prober.probe(backup),
        );
        let view = self.liveness.assess(probe_primary, probe_backup);
        if view.blackout() {
            warn!("Cycle {}: both gateways unreachable", self.cycle);
        }

        let gateways = self.config.gateways.pair();
        let interfaces = telemetry.interfaces();
        let routes = telemetry.routes();
        let names = telemetry.name_map();

        if reset_requested {
            let targets: Vec<(IfIndex, String)> = interfaces
                .iter()
                .map(|i| (i.index, i.name.clone()))
                .collect();
            info!("Manual anomaly reset: {} interfaces", targets.len());
            for command in self.guard.reset_all(&targets) {
                self.dispatcher.apply_quarantine(&command).await;
            }
            self.rates.clear();
        }

        let mut samples = BTreeMap::new();
        for itf in &interfaces {
            let sample = self
                .rates
                .sample(itf.index, itf.in_octets, itf.out_octets, elapsed);
            if let Some(command) =
                self.guard
                    .observe(itf.index, &itf.name, &sample, itf.admin, now)
            {
                self.dispatcher.apply_quarantine(&command).await;
            }
            samples.insert(itf.index, sample);
        }

        let plan = failover::plan(&view, &gateways, &routes, &names);
        for change in &plan.changes {
            self.dispatcher.replace_route(change).await;
        }
        let quarantined: std::collections::BTreeSet<IfIndex> = interfaces
            .iter()
            .map(|i| i.index)
            .filter(|i| self.guard.is_quarantined(*i))
            .collect();
        for change in repair::plan(&view, &gateways, &interfaces, &routes, &quarantined) {
            self.dispatcher.replace_route(&change).await;
        }

        if self.pending_rebalance && view.primary && view.backup {
            self.pending_rebalance = false;
            for change in balancer::plan(&view, &gateways, &interfaces, &routes) {
                self.dispatcher.replace_route(&change).await;
            }
        }

        let snapshot = self.build_snapshot(&telemetry, &view, &samples, &gateway_edges(&gateways, &routes));
        if let Err(e) = self.store.publish(&snapshot).await {
            error!("Snapshot publication failed: {}", e);
        }
        snapshot
    }

    fn build_snapshot(
        &self,
        telemetry: &telemetry::CycleTelemetry,
        view: &LivenessView,
        samples: &BTreeMap<IfIndex, crate::rates::RateSample>,
        gateway_by_if: &BTreeMap<IfIndex, Ipv4Addr>,
    ) -> Snapshot {
        let gateways = self.config.gateways.pair();
        let interfaces = telemetry.interfaces();
        let routes = telemetry.routes();
        let report = topology::analyze(view, &gateways, &interfaces, &routes);

        let records: Vec<InterfaceRecord> = interfaces
            .iter()
            .map(|itf| {
                let sample = samples.get(&itf.index).copied().unwrap_or_default();
                // A blackout means nothing is reachable upstream, whatever
                // the link layer claims.
                let status = if view.blackout() {
                    OperStatus::Down
                } else {
                    itf.oper
                };
                InterfaceRecord {
                    index: itf.index,
                    name: itf.name.clone(),
                    status,
                    gateway: gateway_by_if.get(&itf.index).copied(),
                    in_octets: itf.in_octets,
                    out_octets: itf.out_octets,
                    in_rate_mibps: bps_to_mibps(sample.in_bps_avg),
                    out_rate_mibps: bps_to_mibps(sample.out_bps_avg),
                }
            })
            .collect();

        let up = records.iter().filter(|r| r.status == OperStatus::Up).count();
        let diagnostic = diagnostic_line(view.blackout(), up, records.len(), &report.message);

        Snapshot {
            taken_at: Utc::now(),
            cycle: self.cycle,
            interfaces: records,
            system: telemetry.system.clone(),
            topology: report,
            diagnostic,
        }
    }
}

fn diagnostic_line(blackout: bool, up: usize, total: usize, topology_message: &str) -> String {
    if blackout {
        "Both gateways unreachable; all interfaces reported DOWN".to_string()
    } else {
        format!("{}/{} interfaces up; {}", up, total, topology_message)
    }
}

/// Gateway dependency edge per interface, restricted to the managed pair.
fn gateway_edges(
    pair: &netguard_common::types::GatewayPair,
    routes: &[netguard_common::types::Route],
) -> BTreeMap<IfIndex, Ipv4Addr> {
    routes
        .iter()
        .filter(|r| pair.contains(r.next_hop))
        .map(|r| (r.if_index, r.next_hop))
        .collect()
}
