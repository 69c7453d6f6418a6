//! The per-cycle published view of the network.
//!
//! A snapshot is internally consistent: it reflects exactly one cycle's
//! observations. Consecutive snapshots may disagree with each other;
//! atomicity per cycle is what matters.

use crate::types::{IfIndex, OperStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Overall topology health for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologySeverity {
    Ok,
    Warning,
    Critical,
}

impl TopologySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologySeverity::Ok => "OK",
            TopologySeverity::Warning => "WARNING",
            TopologySeverity::Critical => "CRITICAL",
        }
    }
}

/// Advisory topology diagnosis attached to each snapshot. It never triggers
/// corrective action by itself; rebalancing is the operator's call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyReport {
    pub severity: TopologySeverity,
    pub message: String,
    /// Interfaces reachable from no gateway this cycle.
    pub orphan_interfaces: Vec<String>,
    /// Interface count per gateway (node degree of each gateway node).
    pub gateway_load: BTreeMap<String, usize>,
}

impl TopologyReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            severity: TopologySeverity::Ok,
            message: message.into(),
            orphan_interfaces: Vec::new(),
            gateway_load: BTreeMap::new(),
        }
    }
}

/// Scalar system information read from the device each cycle. Any field the
/// agent could not answer is simply absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub descr: Option<String>,
    pub name: Option<String>,
    pub uptime: Option<String>,
    pub contact: Option<String>,
    pub location: Option<String>,
}

/// One interface row in the published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub index: IfIndex,
    pub name: String,
    /// Published status. During a blackout this is forced to DOWN no matter
    /// what the link layer reported.
    pub status: OperStatus,
    /// Gateway dependency edge, if the interface had a route this cycle.
    pub gateway: Option<Ipv4Addr>,
    pub in_octets: u64,
    pub out_octets: u64,
    /// Smoothed rates at the presentation unit (MiB/s).
    pub in_rate_mibps: f64,
    pub out_rate_mibps: f64,
}

/// One cycle's complete, internally consistent published state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub cycle: u64,
    pub interfaces: Vec<InterfaceRecord>,
    pub system: SystemInfo,
    pub topology: TopologyReport,
    /// Human-readable diagnostic line for the summary node.
    pub diagnostic: String,
}

impl Snapshot {
    pub fn up_count(&self) -> usize {
        self.interfaces
            .iter()
            .filter(|i| i.status == OperStatus::Up)
            .count()
    }

    pub fn down_count(&self) -> usize {
        self.interfaces.len() - self.up_count()
    }
}

/// Convert bytes/second (the internal unit) to MiB/s for presentation.
pub fn bps_to_mibps(bps: f64) -> f64 {
    bps / (1024.0 * 1024.0)
}
