//! Topology analysis.
//!
//! Builds the cycle's dependency graph (up interfaces, live gateways, and
//! the route edges between them), finds its connected components, and
//! grades the result. The report is advisory: isolation is CRITICAL,
//! a lopsided gateway load is WARNING, and nothing here mutates the device.

use crate::liveness::LivenessView;
use netguard_common::snapshot::{TopologyReport, TopologySeverity};
use netguard_common::types::{GatewayPair, IfIndex, Interface, OperStatus, Route};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::Ipv4Addr;

/// Maximum tolerated difference in interface count between the two
/// gateways before the load is called imbalanced.
pub const DEGREE_TOLERANCE: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Node {
    Interface(IfIndex),
    Gateway(Ipv4Addr),
}

/// Analyze one cycle's topology.
pub fn analyze(
    liveness: &LivenessView,
    gateways: &GatewayPair,
    interfaces: &[Interface],
    routes: &[Route],
) -> TopologyReport {
    let up: Vec<&Interface> = interfaces
        .iter()
        .filter(|i| i.oper == OperStatus::Up)
        .collect();

    if up.is_empty() {
        return TopologyReport {
            severity: TopologySeverity::Critical,
            message: "No operational interfaces".to_string(),
            orphan_interfaces: Vec::new(),
            gateway_load: BTreeMap::new(),
        };
    }

    // Adjacency over interfaces, live gateways, and route edges. A route
    // through a dead gateway contributes no connectivity.
    let mut adjacency: HashMap<Node, Vec<Node>> = HashMap::new();
    for itf in &up {
        adjacency.entry(Node::Interface(itf.index)).or_default();
    }
    for gw in liveness.live_gateways(gateways) {
        adjacency.entry(Node::Gateway(gw)).or_default();
    }

    let up_set: BTreeSet<IfIndex> = up.iter().map(|i| i.index).collect();
    let mut gateway_load: BTreeMap<String, usize> = liveness
        .live_gateways(gateways)
        .iter()
        .map(|gw| (gw.to_string(), 0))
        .collect();

    for route in routes {
        if !up_set.contains(&route.if_index) {
            continue;
        }
        if !liveness.is_live(route.next_hop, gateways) {
            continue;
        }
        let a = Node::Interface(route.if_index);
        let b = Node::Gateway(route.next_hop);
        adjacency.entry(a.clone()).or_default().push(b.clone());
        adjacency.entry(b).or_default().push(a);
        *gateway_load.entry(route.next_hop.to_string()).or_insert(0) += 1;
    }

    // Isolation is only diagnosed when the graph splits into more pieces
    // than the live gateways account for; each live gateway legitimately
    // anchors its own component.
    let names: BTreeMap<IfIndex, &str> = up.iter().map(|i| (i.index, i.name.as_str())).collect();
    let component_list = components(&adjacency);
    let component_budget = liveness.live_gateways(gateways).len().max(1);
    let mut orphan_interfaces = Vec::new();
    if component_list.len() > component_budget {
        for component in component_list {
            let has_gateway = component.iter().any(|n| matches!(n, Node::Gateway(_)));
            if has_gateway {
                continue;
            }
            for node in component {
                if let Node::Interface(index) = node {
                    orphan_interfaces
                        .push(names.get(&index).map(|n| n.to_string()).unwrap_or_default());
                }
            }
        }
    }
    orphan_interfaces.sort();

    if !orphan_interfaces.is_empty() {
        return TopologyReport {
            severity: TopologySeverity::Critical,
            message: format!(
                "{} interface(s) unreachable from any gateway",
                orphan_interfaces.len()
            ),
            orphan_interfaces,
            gateway_load,
        };
    }

    let loads: Vec<usize> = gateway_load.values().copied().collect();
    let imbalance = match (loads.iter().max(), loads.iter().min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    };
    if gateway_load.len() >= 2 && imbalance > DEGREE_TOLERANCE {
        return TopologyReport {
            severity: TopologySeverity::Warning,
            message: format!("Gateway load imbalanced by {} interface(s)", imbalance),
            orphan_interfaces,
            gateway_load,
        };
    }

    TopologyReport {
        severity: TopologySeverity::Ok,
        message: "Topology healthy".to_string(),
        orphan_interfaces,
        gateway_load,
    }
}

fn components(adjacency: &HashMap<Node, Vec<Node>>) -> Vec<Vec<Node>> {
    let mut seen: BTreeSet<Node> = BTreeSet::new();
    let mut result = Vec::new();

    let mut nodes: Vec<&Node> = adjacency.keys().collect();
    nodes.sort();

    for start in nodes {
        if seen.contains(start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start.clone()]);
        seen.insert(start.clone());
        while let Some(node) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(&node) {
                for next in neighbors {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
            component.push(node);
        }
        result.push(component);
    }
    result
}
