//! Route auto-repair.
//!
//! An interface that is operationally up but owns no route in this cycle's
//! table gets one installed, pointed at its desired gateway. The destination
//! subnet is derived from the interface index, matching the lab's addressing
//! plan; replace semantics make a duplicate repair harmless.

use crate::actions::{ChangeReason, RouteChange};
use crate::liveness::LivenessView;
use netguard_common::assignment::desired_gateway;
use netguard_common::types::{GatewayPair, IfIndex, Interface, OperStatus, Route};
use std::collections::BTreeSet;
use tracing::debug;

/// Destination subnet served by an interface, by addressing convention.
/// `None` for indices past the octet range: the convention only covers the
/// lab's interface numbering, and an unrepresentable subnet would make the
/// route command fail every cycle.
pub fn repair_subnet(index: IfIndex) -> Option<String> {
    if index > 255 {
        return None;
    }
    Some(format!("10.100.{}.0/24", index))
}

/// Plan repairs for interfaces that are up yet routeless.
///
/// During a blackout nothing is planned; a repaired route would point at a
/// dead gateway. Quarantined interfaces are excluded, and an interface
/// whose desired gateway is down is left alone until that gateway recovers
/// or a failover cycle reassigns it.
pub fn plan(
    liveness: &LivenessView,
    gateways: &GatewayPair,
    interfaces: &[Interface],
    routes: &[Route],
    quarantined: &BTreeSet<IfIndex>,
) -> Vec<RouteChange> {
    if liveness.blackout() {
        return Vec::new();
    }

    let routed: BTreeSet<IfIndex> = routes.iter().map(|r| r.if_index).collect();

    let mut changes = Vec::new();
    for itf in interfaces {
        if itf.oper != OperStatus::Up
            || routed.contains(&itf.index)
            || quarantined.contains(&itf.index)
        {
            continue;
        }
        let desired = desired_gateway(itf.index, gateways);
        if !liveness.is_live(desired, gateways) {
            continue;
        }
        let dest_cidr = match repair_subnet(itf.index) {
            Some(cidr) => cidr,
            None => {
                debug!(
                    "No conventional subnet for {} (idx {}); skipping repair",
                    itf.name, itf.index
                );
                continue;
            }
        };
        changes.push(RouteChange {
            dest_cidr,
            gateway: desired,
            if_index: itf.index,
            if_name: itf.name.clone(),
            reason: ChangeReason::Repair,
        });
    }
    changes
}
