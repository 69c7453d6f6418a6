//! Manually triggered round-robin rebalancing.
//!
//! Rebalancing never runs on its own; the operator drops a trigger file and
//! the next cycle redistributes every operationally-up interface across the
//! two gateways in strict alternation, ordered by interface index. The
//! result is deterministic for a given up-set.

use crate::actions::{ChangeReason, RouteChange};
use crate::liveness::LivenessView;
use crate::repair::repair_subnet;
use netguard_common::types::{GatewayPair, IfIndex, Interface, OperStatus, Route};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Plan a full redistribution of up interfaces across both gateways.
///
/// Interfaces are sorted by index and assigned primary, backup, primary,
/// backup... Existing route destinations are kept where present; an
/// interface with no route gets its conventional subnet. Requires both
/// gateways alive: rebalancing onto a dead gateway would immediately be
/// undone by failover.
pub fn plan(
    liveness: &LivenessView,
    gateways: &GatewayPair,
    interfaces: &[Interface],
    routes: &[Route],
) -> Vec<RouteChange> {
    if !liveness.primary || !liveness.backup {
        info!("Rebalance skipped: both gateways must be reachable");
        return Vec::new();
    }

    let dest_by_if: BTreeMap<IfIndex, String> =
        routes.iter().map(|r| (r.if_index, r.cidr())).collect();

    let mut up: Vec<&Interface> = interfaces
        .iter()
        .filter(|i| i.oper == OperStatus::Up)
        .collect();
    up.sort_by_key(|i| i.index);

    // Resolve destinations first: an interface with neither a route nor a
    // representable conventional subnet cannot take part.
    let mut eligible = Vec::with_capacity(up.len());
    for itf in up {
        let dest_cidr = match dest_by_if
            .get(&itf.index)
            .cloned()
            .or_else(|| repair_subnet(itf.index))
        {
            Some(cidr) => cidr,
            None => {
                debug!(
                    "No destination for {} (idx {}); excluded from rebalance",
                    itf.name, itf.index
                );
                continue;
            }
        };
        eligible.push((itf, dest_cidr));
    }

    let mut changes = Vec::with_capacity(eligible.len());
    for (slot, (itf, dest_cidr)) in eligible.into_iter().enumerate() {
        let gateway = if slot % 2 == 0 {
            gateways.primary
        } else {
            gateways.backup
        };
        changes.push(RouteChange {
            dest_cidr,
            gateway,
            if_index: itf.index,
            if_name: itf.name.clone(),
            reason: ChangeReason::Rebalance,
        });
    }

    info!("Rebalance plan: {} routes across both gateways", changes.len());
    changes
}
