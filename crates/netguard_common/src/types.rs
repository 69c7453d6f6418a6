//! Core domain types observed from the managed device each cycle.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Protocol-level interface index (SNMP ifIndex).
pub type IfIndex = u32;

/// Administrative status of an interface (ifAdminStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminStatus {
    Up,
    Down,
}

impl AdminStatus {
    /// Parse the raw SNMP integer value ("1" = up, anything else = down).
    pub fn from_snmp(raw: &str) -> Self {
        if raw.trim() == "1" {
            AdminStatus::Up
        } else {
            AdminStatus::Down
        }
    }

    /// SNMP integer value for set operations.
    pub fn snmp_value(&self) -> &'static str {
        match self {
            AdminStatus::Up => "1",
            AdminStatus::Down => "2",
        }
    }
}

/// Operational status of an interface (ifOperStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperStatus {
    Up,
    Down,
}

impl OperStatus {
    pub fn from_snmp(raw: &str) -> Self {
        if raw.trim() == "1" {
            OperStatus::Up
        } else {
            OperStatus::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperStatus::Up => "UP",
            OperStatus::Down => "DOWN",
        }
    }
}

/// One interface as observed in a single telemetry cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub index: IfIndex,
    pub name: String,
    pub admin: AdminStatus,
    pub oper: OperStatus,
    /// Cumulative inbound byte counter (monotonic, may wrap).
    pub in_octets: u64,
    /// Cumulative outbound byte counter (monotonic, may wrap).
    pub out_octets: u64,
}

/// One routing table entry as observed in a single telemetry cycle.
///
/// Never persisted beyond the cycle: the controller's job is to make the
/// live route table match the desired assignment, not to own a route
/// database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination network address (the route table instance index).
    pub dest: Ipv4Addr,
    /// Next-hop gateway.
    pub next_hop: Ipv4Addr,
    /// Owning interface.
    pub if_index: IfIndex,
}

impl Route {
    /// Destination in CIDR notation as used by `ip route replace`.
    pub fn cidr(&self) -> String {
        format!("{}/24", self.dest)
    }
}

/// The two configured upstream gateways. Roles are symmetric: either one
/// may be "current" for a given interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPair {
    pub primary: Ipv4Addr,
    pub backup: Ipv4Addr,
}

impl GatewayPair {
    pub fn new(primary: Ipv4Addr, backup: Ipv4Addr) -> Self {
        Self { primary, backup }
    }

    /// Whether `ip` is one of the configured gateways.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip == self.primary || ip == self.backup
    }

    /// The peer of `ip`. Callers must pass one of the two gateways.
    pub fn other(&self, ip: Ipv4Addr) -> Ipv4Addr {
        if ip == self.primary {
            self.backup
        } else {
            self.primary
        }
    }
}
