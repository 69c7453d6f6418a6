//! Failover / failback planning.
//!
//! Pure decision logic: given this cycle's liveness verdict and route set,
//! produce the replace-route commands that move traffic off a dead gateway
//! and pull ideal routes back onto a recovered one. During a blackout no
//! mutation is planned at all; there is no safe target.

use crate::actions::{ChangeReason, RouteChange};
use crate::liveness::LivenessView;
use netguard_common::assignment::desired_gateway;
use netguard_common::types::{GatewayPair, IfIndex, Route};
use std::collections::BTreeMap;
use tracing::debug;

/// The routing decision for one cycle.
#[derive(Debug, Default)]
pub struct FailoverPlan {
    pub changes: Vec<RouteChange>,
    pub blackout: bool,
}

/// Plan route moves for one cycle.
///
/// Per route: if its current gateway is dead and the peer is alive, move it
/// (failover). If its current gateway is alive but the desired assignment
/// names the peer and the peer is alive, move it back (failback) - this
/// corrects both genuine recoveries and historical missassignments.
pub fn plan(
    liveness: &LivenessView,
    gateways: &GatewayPair,
    routes: &[Route],
    names: &BTreeMap<IfIndex, String>,
) -> FailoverPlan {
    if liveness.blackout() {
        debug!("Both gateways unreachable; suppressing all route mutation");
        return FailoverPlan {
            changes: Vec::new(),
            blackout: true,
        };
    }

    let mut changes = Vec::new();
    for route in routes {
        if !gateways.contains(route.next_hop) {
            continue;
        }
        let current = route.next_hop;
        let peer = gateways.other(current);
        let current_live = liveness.is_live(current, gateways);

        let (target, reason) = if !current_live && liveness.is_live(peer, gateways) {
            (peer, ChangeReason::Failover)
        } else if current_live {
            let desired = desired_gateway(route.if_index, gateways);
            if desired != current && liveness.is_live(desired, gateways) {
                (desired, ChangeReason::Failback)
            } else {
                continue;
            }
        } else {
            continue;
        };

        changes.push(RouteChange {
            dest_cidr: route.cidr(),
            gateway: target,
            if_index: route.if_index,
            if_name: names.get(&route.if_index).cloned().unwrap_or_default(),
            reason,
        });
    }

    FailoverPlan {
        changes,
        blackout: false,
    }
}
