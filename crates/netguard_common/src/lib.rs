//! Shared types for the netguard daemon and CLI.

pub mod assignment;
pub mod snapshot;
pub mod triggers;
pub mod types;

pub use assignment::desired_gateway;
pub use snapshot::{InterfaceRecord, Snapshot, SystemInfo, TopologyReport, TopologySeverity};
pub use types::{AdminStatus, GatewayPair, IfIndex, Interface, OperStatus, Route};
